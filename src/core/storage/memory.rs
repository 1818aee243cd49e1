// src/core/storage/memory.rs

//! The process-local cache backend: a plain map guarded by a mutex.
//!
//! There is no eviction at this layer. The memory watchdog terminates the
//! process when it outgrows the configured budget, and a supervisor restarts
//! it with a cold cache.

use crate::core::TwiceError;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, now_secs};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
struct StoredEntry {
    element: Element,
    expires_on: u64,
}

/// In-memory `CacheBackend` implementation.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, counting ones that have expired but not yet
    /// been swept by a read.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Element>, TwiceError> {
        let now = now_secs();
        let mut entries = self.entries.lock().unwrap();
        let mut output = HashMap::new();
        for key in keys {
            let expired = match entries.get(key) {
                Some(stored) if now > stored.expires_on => true,
                Some(stored) => {
                    output.insert(key.clone(), stored.element.clone());
                    false
                }
                None => false,
            };
            if expired {
                // Expired: report absent and reclaim lazily.
                entries.remove(key);
            }
        }
        Ok(output)
    }

    async fn set(
        &self,
        new_entries: HashMap<String, Element>,
        ttl_seconds: u64,
    ) -> Result<(), TwiceError> {
        let expires_on = now_secs() + ttl_seconds;
        let mut entries = self.entries.lock().unwrap();
        for (key, element) in new_entries {
            entries.insert(key, StoredEntry { element, expires_on });
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), TwiceError> {
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), TwiceError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}
