// src/core/store.rs

//! The DataStore orchestrator: one batched `get` that consults the cache
//! backend, routes misses and invalid entries to the element fetchers
//! concurrently, and merges the results.

use crate::core::elements::{ElementRegistry, Freshness};
use crate::core::protocol::Request;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, KIND_SESSION, now_secs};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Element kinds fetched on every request, alongside the page itself.
pub const PREFETCH_KINDS: &[&str] = &[KIND_SESSION];

/// A soft-stale entry queued for background refresh.
#[derive(Debug)]
pub struct RefreshJob {
    pub key: String,
    pub request: Request,
}

/// Batched element retrieval over one cache backend and the element registry.
pub struct DataStore {
    cache: Arc<dyn CacheBackend>,
    registry: ElementRegistry,
    refresh_tx: mpsc::Sender<RefreshJob>,
}

impl DataStore {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        registry: ElementRegistry,
        refresh_tx: mpsc::Sender<RefreshJob>,
    ) -> Self {
        Self {
            cache,
            registry,
            refresh_tx,
        }
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// Gets, fetches and returns elements for the given keys.
    ///
    /// Never fails as a batch: a backend error downgrades every key to a
    /// miss, and an individual fetch failure leaves its key out of the
    /// result. Concurrent calls for the same key may both fetch; the
    /// soft-stale window keeps that cheap in practice.
    pub async fn get(&self, keys: &[String], request: &Request) -> HashMap<String, Element> {
        let cached = match self.cache.get(keys).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache backend error, treating {} key(s) as misses: {e}", keys.len());
                HashMap::new()
            }
        };

        let now = now_secs();
        let mut output = HashMap::new();
        let mut missing: Vec<String> = Vec::new();

        for key in keys {
            let Some(element) = cached.get(key) else {
                info!("MISS [{key}]");
                missing.push(key.clone());
                continue;
            };
            let Some((kind, _)) = self.registry.for_key(key) else {
                warn!("Cached element with unknown kind [{key}]");
                continue;
            };
            match kind.validate(now, element) {
                Freshness::Fresh => {
                    debug!("HIT [{key}]");
                    output.insert(key.clone(), element.clone());
                }
                Freshness::SoftStale => {
                    info!("STALE-SOFT [{key}]");
                    output.insert(key.clone(), element.clone());
                    let job = RefreshJob {
                        key: key.clone(),
                        request: request.clone(),
                    };
                    if self.refresh_tx.try_send(job).is_err() {
                        warn!("Refresh queue full, dropping job for [{key}]");
                    }
                }
                Freshness::HardStale => {
                    info!("INVALID [{key}]");
                    missing.push(key.clone());
                }
            }
        }

        // Fetch everything missing or invalid concurrently; wait for all.
        let fetches = missing.iter().map(|key| async move {
            let result = match self.registry.for_key(key) {
                Some((kind, id)) => kind.fetch(request, id).await,
                None => Err(crate::core::TwiceError::UnknownElementKind(key.clone())),
            };
            (key.clone(), result)
        });
        for (key, result) in join_all(fetches).await {
            match result {
                Ok(element) => {
                    output.insert(key, element);
                }
                // A failed fetch surfaces as an absent element, not a
                // failed batch.
                Err(e) => warn!("Fetch failed for [{key}]: {e}"),
            }
        }

        output
    }

    /// Re-fetches one element, letting its extract step overwrite the cache.
    /// On failure the prior entry is left in place.
    pub async fn refresh(&self, job: RefreshJob) {
        let Some((kind, id)) = self.registry.for_key(&job.key) else {
            return;
        };
        debug!("REFRESH [{}]", job.key);
        if let Err(e) = kind.fetch(&job.request, id).await {
            warn!("Background refresh failed for [{}]: {e}", job.key);
        }
    }

    pub async fn delete(&self, keys: &[String]) {
        if let Err(e) = self.cache.delete(keys).await {
            warn!("Cache delete failed: {e}");
        }
    }

    pub async fn flush(&self) {
        if let Err(e) = self.cache.flush().await {
            warn!("Cache flush failed: {e}");
        }
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("registry", &self.registry)
            .finish()
    }
}
