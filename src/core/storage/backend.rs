// src/core/storage/backend.rs

//! The uniform cache-backend contract shared by the in-memory and remote
//! implementations.

use crate::core::TwiceError;
use crate::core::storage::element::Element;
use async_trait::async_trait;
use std::collections::HashMap;

/// Batched, TTL-aware cache operations.
///
/// `get` reports missing keys by omitting them from the returned map; a key
/// that is present but maps to `FragmentValue::Absent` is a stored negative
/// entry, which is a different thing.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Batched multi-get. Keys past their TTL are reported as absent.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Element>, TwiceError>;

    /// Stores every entry with the same TTL. Atomic per key, not globally.
    async fn set(
        &self,
        entries: HashMap<String, Element>,
        ttl_seconds: u64,
    ) -> Result<(), TwiceError>;

    /// Deletes the given keys. Best effort.
    async fn delete(&self, keys: &[String]) -> Result<(), TwiceError>;

    /// Drops every key.
    async fn flush(&self) -> Result<(), TwiceError>;
}
