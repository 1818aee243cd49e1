// src/core/purge.rs

//! The variant index and the out-of-band purge channel.
//!
//! The index maps a URI to every page-variant key ever stored for it, so a
//! purge-by-URL can hit all variants without knowing the cookie mix that
//! produced them. It is written from fetch completions and read from purge
//! handling only; it is not on the serving hot path.

use crate::core::protocol::{Request, Response};
use crate::core::storage::element::make_key;
use crate::core::store::DataStore;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Kinds deleted wholesale by a purge-by-session.
pub const SESSION_PURGE_KINDS: &[&str] = &["favorite", "subscription", "session"];

/// URI -> known page-variant keys.
#[derive(Debug, Default)]
pub struct VariantIndex {
    entries: DashMap<String, HashSet<String>>,
}

impl VariantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a variant key for a URI. Returns `true` if it was new.
    pub fn insert(&self, uri: &str, key: &str) -> bool {
        self.entries
            .entry(uri.to_string())
            .or_default()
            .insert(key.to_string())
    }

    /// All known variant keys for a URI.
    pub fn variants(&self, uri: &str) -> Option<Vec<String>> {
        self.entries
            .get(uri)
            .map(|set| set.iter().cloned().collect())
    }

    /// Removes and returns the entry for a URI.
    pub fn take(&self, uri: &str) -> Option<Vec<String>> {
        self.entries
            .remove(uri)
            .map(|(_, set)| set.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Interprets purge requests. Best effort: the ack does not wait for cache
/// propagation, and racing readers may briefly observe purged values.
#[derive(Debug)]
pub struct PurgeHandler {
    store: Arc<DataStore>,
    variants: Arc<VariantIndex>,
}

impl PurgeHandler {
    pub fn new(store: Arc<DataStore>, variants: Arc<VariantIndex>) -> Self {
        Self { store, variants }
    }

    pub async fn handle(&self, request: &Request, kind: &str) -> Response {
        let kind = kind.trim().to_ascii_lowercase();
        let uri = request.uri.as_str();
        info!("Expire type: {kind}, arg: {uri}");

        match kind.as_str() {
            "*" => {
                self.store.flush().await;
                info!("Cleared entire cache");
            }
            "url" => {
                if let Some(keys) = self.variants.take(uri) {
                    self.store.delete(&keys).await;
                    info!("Deleted all variants of {uri}");
                }
            }
            "session" => {
                let id = uri.trim_start_matches('/');
                let keys: Vec<String> = SESSION_PURGE_KINDS
                    .iter()
                    .map(|purge_kind| make_key(purge_kind, id))
                    .collect();
                self.store.delete(&keys).await;
                info!("Deleted session-related keys: {keys:?}");
            }
            other => {
                let key = make_key(other, uri.trim_start_matches('/'));
                self.store.delete(std::slice::from_ref(&key)).await;
                info!("Deleted {key}");
            }
        }

        Response::with_body(200, format!("Expired {kind}_{uri}"))
    }
}
