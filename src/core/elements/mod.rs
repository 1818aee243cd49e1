// src/core/elements/mod.rs

//! The element registry: per element kind, the operations to derive its
//! cache key, fetch it from its authoritative source, and judge cached
//! copies. Adding a kind is registering one more implementation; nothing
//! dispatches by string concatenation.

mod db;
mod kv;
mod page;
mod session;

pub use db::DbElement;
pub use kv::KvElement;
pub use page::{CacheDecision, PageConfig, PageElement, cache_decision, classify, declared_cookies};
pub use session::SessionElement;

use crate::core::TwiceError;
use crate::core::protocol::Request;
use crate::core::storage::Element;
use crate::core::storage::element::{element_id, element_type};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a cached element sits on its freshness timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve from cache.
    Fresh,
    /// Serve from cache, refresh in the background.
    SoftStale,
    /// Treat as a miss and block for a refetch.
    HardStale,
}

/// One element kind's operations.
#[async_trait]
pub trait ElementKind: Send + Sync {
    /// The kind name; must not contain an underscore.
    fn kind(&self) -> &'static str;

    /// Whether markers of this kind are only fetched when the request
    /// carries a session.
    fn requires_session(&self) -> bool {
        true
    }

    /// Derives the cache key for this kind, or `None` when no key applies
    /// (e.g. a session kind on a request without a session cookie).
    fn hash(&self, request: &Request, id: Option<&str>) -> Option<String>;

    /// Produces the element from its authoritative source, including any
    /// post-processing and cache write.
    async fn fetch(&self, request: &Request, id: &str) -> Result<Element, TwiceError>;

    /// Judges a cached copy. The default is always-fresh: TTL expiry is the
    /// cache backend's job.
    fn validate(&self, _now: u64, _cached: &Element) -> Freshness {
        Freshness::Fresh
    }

    /// Increment side effect for `incr` template commands.
    async fn incr(&self, _id: &str) -> Result<(), TwiceError> {
        Err(TwiceError::UnsupportedOperation(self.kind()))
    }

    /// Decrement side effect for `decr` template commands.
    async fn decr(&self, _id: &str) -> Result<(), TwiceError> {
        Err(TwiceError::UnsupportedOperation(self.kind()))
    }

    /// Store side effect for `incr`/`decr` with a default value.
    async fn set_value(&self, _id: &str, _value: &str) -> Result<(), TwiceError> {
        Err(TwiceError::UnsupportedOperation(self.kind()))
    }
}

/// The kind-name to implementation map.
#[derive(Default)]
pub struct ElementRegistry {
    kinds: HashMap<&'static str, Arc<dyn ElementKind>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, element: Arc<dyn ElementKind>) {
        debug_assert!(
            !element.kind().contains('_'),
            "kind names must not contain underscores"
        );
        self.kinds.insert(element.kind(), element);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ElementKind>> {
        self.kinds.get(kind)
    }

    /// Derives the key for `(kind, id)` against a request; `None` for
    /// unknown kinds or when the kind declines to produce a key.
    pub fn hash(&self, request: &Request, kind: &str, id: Option<&str>) -> Option<String> {
        self.get(kind)?.hash(request, id)
    }

    /// Resolves a full element key to its kind implementation and id.
    pub fn for_key<'a>(&self, key: &'a str) -> Option<(&Arc<dyn ElementKind>, &'a str)> {
        let kind = self.get(element_type(key))?;
        Some((kind, element_id(key)))
    }
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}
