// src/server/context.rs

use crate::config::Config;
use crate::core::pipeline::Pipeline;
use crate::core::store::{DataStore, RefreshJob};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<DataStore>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// Consumed by the refresh worker at spawn time.
    pub refresh_rx: Option<mpsc::Receiver<RefreshJob>>,
}
