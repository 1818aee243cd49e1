// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod spawner;

pub use context::ServerContext;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize backends, the element registry, the pipeline, and the listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Start the main connection acceptance loop. This runs until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
