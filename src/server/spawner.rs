// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use crate::core::tasks::memory_monitor::MemoryMonitor;
use crate::core::tasks::refresh::RefreshWorker;
use anyhow::{Result, anyhow};

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let refresh_rx = ctx
        .refresh_rx
        .take()
        .ok_or_else(|| anyhow!("refresh channel already consumed"))?;

    // --- Stale-page refresh worker ---
    let worker = RefreshWorker {
        store: ctx.store.clone(),
        rx: refresh_rx,
    };
    let shutdown_rx_refresh = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        worker.run(shutdown_rx_refresh).await;
        Ok(())
    });

    // --- Memory watchdog ---
    let monitor = MemoryMonitor::new(ctx.config.memory_limit);
    let shutdown_rx_monitor = ctx.shutdown_tx.subscribe();
    ctx.background_tasks
        .spawn(async move { monitor.run(shutdown_rx_monitor).await });

    Ok(())
}
