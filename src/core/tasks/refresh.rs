// src/core/tasks/refresh.rs

//! The background refresh worker. Soft-stale cache hits enqueue a job here;
//! each job re-fetches the element so its extract step overwrites the cache
//! entry, without ever blocking a response.

use crate::core::store::{DataStore, RefreshJob};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// A task responsible for performing background cache refreshes.
pub struct RefreshWorker {
    pub store: Arc<DataStore>,
    /// Receives refresh jobs from the serving path.
    pub rx: mpsc::Receiver<RefreshJob>,
}

impl RefreshWorker {
    /// Runs the main loop for the refresh worker.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Cache refresh worker task started.");
        loop {
            tokio::select! {
                Some(job) = self.rx.recv() => {
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        store.refresh(job).await;
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Cache refresh worker shutting down.");
                    return;
                }
            }
        }
    }
}
