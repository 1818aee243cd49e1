// src/core/elements/kv.rs

//! The `memcache` element kind: small hot values from the K/V upstream.
//! The only kind eligible for logged-out requests, and the only one with
//! increment/decrement/store side effects.

use crate::core::TwiceError;
use crate::core::elements::ElementKind;
use crate::core::protocol::Request;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, FragmentValue, KIND_KV, make_key};
use crate::upstream::KvStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// K/V fragments go stale fast; keep proxy copies briefly.
const KV_TTL: u64 = 30;

/// The `memcache` element kind.
pub struct KvElement {
    kv: Arc<dyn KvStore>,
    cache: Arc<dyn CacheBackend>,
}

impl KvElement {
    pub fn new(kv: Arc<dyn KvStore>, cache: Arc<dyn CacheBackend>) -> Self {
        Self { kv, cache }
    }

    async fn store_copy(&self, id: &str, value: FragmentValue) {
        let key = make_key(KIND_KV, id);
        let entries = HashMap::from([(key.clone(), Element::Fragment(value))]);
        if let Err(e) = self.cache.set(entries, KV_TTL).await {
            warn!("Failed to cache fragment [{key}]: {e}");
        }
    }
}

#[async_trait]
impl ElementKind for KvElement {
    fn kind(&self) -> &'static str {
        KIND_KV
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn hash(&self, _request: &Request, id: Option<&str>) -> Option<String> {
        id.map(|id| make_key(KIND_KV, id))
    }

    async fn fetch(&self, _request: &Request, id: &str) -> Result<Element, TwiceError> {
        debug!("Looking up memcache {id}");
        let value = match self.kv.get(id).await? {
            Some(bytes) => FragmentValue::Scalar(String::from_utf8_lossy(&bytes).into_owned()),
            None => FragmentValue::Absent,
        };
        self.store_copy(id, value.clone()).await;
        Ok(Element::Fragment(value))
    }

    async fn incr(&self, id: &str) -> Result<(), TwiceError> {
        debug!("Incrementing memcache {id}");
        if let Some(next) = self.kv.incr(id).await? {
            self.store_copy(id, FragmentValue::Scalar(next.to_string()))
                .await;
        }
        Ok(())
    }

    async fn decr(&self, id: &str) -> Result<(), TwiceError> {
        debug!("Decrementing memcache {id}");
        if let Some(next) = self.kv.decr(id).await? {
            self.store_copy(id, FragmentValue::Scalar(next.to_string()))
                .await;
        }
        Ok(())
    }

    async fn set_value(&self, id: &str, value: &str) -> Result<(), TwiceError> {
        debug!("Setting memcache {id}");
        self.kv.set(id, value.as_bytes()).await?;
        self.store_copy(id, FragmentValue::Scalar(value.to_string()))
            .await;
        Ok(())
    }
}

impl std::fmt::Debug for KvElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvElement").finish()
    }
}
