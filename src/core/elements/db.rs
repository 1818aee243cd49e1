// src/core/elements/db.rs

//! The `viewdb` element kind: single-value database lookups, only fetched
//! for logged-in requests.

use crate::core::TwiceError;
use crate::core::elements::ElementKind;
use crate::core::protocol::Request;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, FragmentValue, KIND_DB, make_key};
use crate::upstream::Database;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const DB_TTL: u64 = 30;

/// The `viewdb` element kind.
pub struct DbElement {
    db: Arc<dyn Database>,
    cache: Arc<dyn CacheBackend>,
}

impl DbElement {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn CacheBackend>) -> Self {
        Self { db, cache }
    }
}

#[async_trait]
impl ElementKind for DbElement {
    fn kind(&self) -> &'static str {
        KIND_DB
    }

    fn hash(&self, _request: &Request, id: Option<&str>) -> Option<String> {
        id.map(|id| make_key(KIND_DB, id))
    }

    async fn fetch(&self, _request: &Request, id: &str) -> Result<Element, TwiceError> {
        debug!("Looking up viewdb {id}");
        let value = match self.db.lookup(id).await? {
            Some(found) => FragmentValue::Scalar(found),
            None => FragmentValue::Absent,
        };
        let key = make_key(KIND_DB, id);
        let entries = HashMap::from([(key.clone(), Element::Fragment(value.clone()))]);
        if let Err(e) = self.cache.set(entries, DB_TTL).await {
            warn!("Failed to cache fragment [{key}]: {e}");
        }
        Ok(Element::Fragment(value))
    }
}

impl std::fmt::Debug for DbElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbElement").finish()
    }
}
