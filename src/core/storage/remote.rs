// src/core/storage/remote.rs

//! The remote cache backend: elements bincode-encoded into a shared K/V
//! store, so several proxy instances can share one cache tier.

use crate::core::TwiceError;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::Element;
use crate::upstream::KvPool;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// `CacheBackend` over a pooled K/V connection.
#[derive(Debug)]
pub struct RemoteCache {
    pool: Arc<KvPool>,
}

impl RemoteCache {
    pub fn new(pool: Arc<KvPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for RemoteCache {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Element>, TwiceError> {
        let raw = self.pool.get_many(keys).await?;
        let mut output = HashMap::new();
        for (key, (_, bytes)) in raw {
            match bincode::decode_from_slice::<Element, _>(&bytes, bincode::config::standard()) {
                Ok((element, _)) => {
                    output.insert(key, element);
                }
                Err(e) => {
                    // An undecodable entry is as good as a miss.
                    warn!("Discarding corrupt cache entry [{key}]: {e}");
                }
            }
        }
        Ok(output)
    }

    async fn set(
        &self,
        entries: HashMap<String, Element>,
        ttl_seconds: u64,
    ) -> Result<(), TwiceError> {
        for (key, element) in entries {
            let encoded = bincode::encode_to_vec(&element, bincode::config::standard())?;
            self.pool.set(&key, &encoded, ttl_seconds).await?;
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), TwiceError> {
        for key in keys {
            self.pool.delete(key).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), TwiceError> {
        self.pool.flush_all().await
    }
}
