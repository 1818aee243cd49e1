// src/core/elements/session.rs

//! The `session` element kind: the logged-in user's row, keyed by a cookie.

use crate::core::TwiceError;
use crate::core::elements::ElementKind;
use crate::core::protocol::Request;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, FragmentValue, KIND_SESSION, make_key};
use crate::upstream::Database;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sessions change rarely; cache them for a day.
const SESSION_TTL: u64 = 86_400;

/// The `session` element kind.
pub struct SessionElement {
    db: Arc<dyn Database>,
    cache: Arc<dyn CacheBackend>,
    cookie_name: String,
}

impl SessionElement {
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<dyn CacheBackend>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            db,
            cache,
            cookie_name: cookie_name.into(),
        }
    }

    /// Extracts the session id from the request's session cookie.
    fn read_session(&self, request: &Request) -> Option<String> {
        let raw = request.cookie(&self.cookie_name)?;
        let decoded = urlencoding::decode(raw)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        (!decoded.is_empty()).then_some(decoded)
    }
}

#[async_trait]
impl ElementKind for SessionElement {
    fn kind(&self) -> &'static str {
        KIND_SESSION
    }

    fn requires_session(&self) -> bool {
        false
    }

    /// No session cookie means no key: the page is served logged-out.
    fn hash(&self, request: &Request, _id: Option<&str>) -> Option<String> {
        self.read_session(request)
            .map(|id| make_key(KIND_SESSION, &id))
    }

    async fn fetch(&self, _request: &Request, id: &str) -> Result<Element, TwiceError> {
        debug!("Looking up session {id}");
        let value = match self.db.session(id).await? {
            Some(fields) => FragmentValue::Record(fields),
            None => FragmentValue::Absent,
        };
        let key = make_key(KIND_SESSION, id);
        let entries = HashMap::from([(key.clone(), Element::Fragment(value.clone()))]);
        if let Err(e) = self.cache.set(entries, SESSION_TTL).await {
            warn!("Failed to cache session [{key}]: {e}");
        }
        Ok(Element::Fragment(value))
    }
}

impl std::fmt::Debug for SessionElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionElement")
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}
