// src/core/tasks/memory_monitor.rs

//! The memory watchdog: samples the process RSS on an interval and forces a
//! shutdown once it exceeds the configured budget. The cache holds no
//! durable state, so a supervisor restart with a cold cache is the cheapest
//! way back under the limit.

use anyhow::{Result, anyhow};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// The background watchdog task.
pub struct MemoryMonitor {
    /// Soft budget in megabytes.
    limit_mb: u64,
}

impl MemoryMonitor {
    pub fn new(limit_mb: u64) -> Self {
        Self { limit_mb }
    }

    /// Runs the sampling loop. Returning an error makes the server's main
    /// loop begin graceful shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("Memory watchdog started ({}MB budget).", self.limit_mb);
        let pid = sysinfo::get_current_pid()
            .map_err(|e| anyhow!("Unable to determine own pid: {e}"))?;
        let mut sys = System::new();
        let mut interval = tokio::time::interval(CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                    let Some(process) = sys.process(pid) else {
                        warn!("Unable to read memory usage!");
                        continue;
                    };
                    let used_mb = process.memory() as f64 / 1_000_000.0;
                    debug!("Memory usage: {used_mb:.2}MB of {}MB", self.limit_mb);
                    if used_mb > self.limit_mb as f64 {
                        return Err(anyhow!(
                            "Using too much memory ({used_mb:.2}MB out of {}MB)",
                            self.limit_mb
                        ));
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Memory watchdog shutting down.");
                    return Ok(());
                }
            }
        }
    }
}
