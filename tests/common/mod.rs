#![allow(dead_code)]

//! Shared test fixtures: scripted upstream stubs and a fully wired pipeline
//! over the in-memory cache backend.

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use twice::TwiceError;
use twice::core::elements::{
    DbElement, ElementRegistry, KvElement, PageConfig, PageElement, SessionElement,
};
use twice::core::pipeline::{Pipeline, PipelineConfig};
use twice::core::protocol::{Method, Request, Response};
use twice::core::purge::{PurgeHandler, VariantIndex};
use twice::core::storage::backend::CacheBackend;
use twice::core::storage::memory::InMemoryCache;
use twice::core::store::{DataStore, RefreshJob};
use twice::upstream::{Database, KvStore, Origin};

pub const CACHE_HEADER: &str = "x-twice-control";
pub const COOKIES_HEADER: &str = "x-twice-vary";
pub const TWICE_HEADER: &str = "x-twice";
pub const PURGE_HEADER: &str = "x-purge";
pub const TEMPLATE_REGEX: &str = r"<%%\s+(.*?)\s+%%>";

/// An origin that replays a scripted queue of responses.
#[derive(Default)]
pub struct StubOrigin {
    pub responses: Mutex<VecDeque<Response>>,
    pub fetches: AtomicUsize,
}

impl StubOrigin {
    pub fn push(&self, response: Response) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for StubOrigin {
    async fn fetch(&self, _request: Request) -> Result<Response, TwiceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TwiceError::UpstreamUnavailable("stub origin exhausted".to_string()))
    }
}

/// An in-memory stand-in for the K/V upstream.
#[derive(Default)]
pub struct StubKv {
    pub values: Mutex<HashMap<String, String>>,
    pub get_calls: AtomicUsize,
}

impl StubKv {
    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for StubKv {
    async fn get(&self, id: &str) -> Result<Option<Bytes>, TwiceError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value(id).map(Bytes::from))
    }

    async fn set(&self, id: &str, value: &[u8]) -> Result<(), TwiceError> {
        self.insert(id, &String::from_utf8_lossy(value));
        Ok(())
    }

    async fn incr(&self, id: &str) -> Result<Option<u64>, TwiceError> {
        let mut values = self.values.lock().unwrap();
        match values.get(id).and_then(|v| v.parse::<u64>().ok()) {
            Some(n) => {
                values.insert(id.to_string(), (n + 1).to_string());
                Ok(Some(n + 1))
            }
            None => Ok(None),
        }
    }

    async fn decr(&self, id: &str) -> Result<Option<u64>, TwiceError> {
        let mut values = self.values.lock().unwrap();
        match values.get(id).and_then(|v| v.parse::<u64>().ok()) {
            Some(n) => {
                let next = n.saturating_sub(1);
                values.insert(id.to_string(), next.to_string());
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }
}

/// An in-memory stand-in for the database.
#[derive(Default)]
pub struct StubDb {
    pub sessions: Mutex<HashMap<String, Vec<(String, String)>>>,
    pub lookups: Mutex<HashMap<String, String>>,
    pub session_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
}

impl StubDb {
    pub fn add_session(&self, id: &str, fields: &[(&str, &str)]) {
        self.sessions.lock().unwrap().insert(
            id.to_string(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    pub fn add_lookup(&self, id: &str, value: &str) {
        self.lookups
            .lock()
            .unwrap()
            .insert(id.to_string(), value.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for StubDb {
    async fn session(&self, id: &str) -> Result<Option<Vec<(String, String)>>, TwiceError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn lookup(&self, id: &str) -> Result<Option<String>, TwiceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookups.lock().unwrap().get(id).cloned())
    }
}

/// A fully wired pipeline over stub upstreams and the in-memory backend.
pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<DataStore>,
    pub cache: Arc<InMemoryCache>,
    pub variants: Arc<VariantIndex>,
    pub origin: Arc<StubOrigin>,
    pub kv: Arc<StubKv>,
    pub db: Arc<StubDb>,
    pub page: Arc<PageElement>,
    pub refresh_rx: mpsc::Receiver<RefreshJob>,
}

pub fn harness() -> Harness {
    let cache = Arc::new(InMemoryCache::new());
    let cache_dyn: Arc<dyn CacheBackend> = cache.clone();
    let origin = Arc::new(StubOrigin::default());
    let kv = Arc::new(StubKv::default());
    let db = Arc::new(StubDb::default());
    let variants = Arc::new(VariantIndex::new());

    let page = Arc::new(PageElement::new(
        origin.clone(),
        cache_dyn.clone(),
        variants.clone(),
        PageConfig {
            cache_header: CACHE_HEADER.to_string(),
            cookies_header: COOKIES_HEADER.to_string(),
            twice_header: TWICE_HEADER.to_string(),
            lang_enabled: false,
            lang_default: "en-us".to_string(),
        },
    ));

    let mut registry = ElementRegistry::new();
    registry.register(page.clone());
    registry.register(Arc::new(SessionElement::new(
        db.clone(),
        cache_dyn.clone(),
        "session_cookie",
    )));
    registry.register(Arc::new(KvElement::new(kv.clone(), cache_dyn.clone())));
    registry.register(Arc::new(DbElement::new(db.clone(), cache_dyn.clone())));

    let (refresh_tx, refresh_rx) = mpsc::channel(64);
    let store = Arc::new(DataStore::new(cache_dyn, registry, refresh_tx));
    let purge = PurgeHandler::new(store.clone(), variants.clone());

    let pipeline = Pipeline::new(
        store.clone(),
        page.clone(),
        purge,
        Regex::new(TEMPLATE_REGEX).unwrap(),
        PipelineConfig {
            purge_header: PURGE_HEADER.to_string(),
            cache_header: CACHE_HEADER.to_string(),
            twice_header: TWICE_HEADER.to_string(),
            cookies_header: COOKIES_HEADER.to_string(),
            rewrite_host: None,
        },
    );

    Harness {
        pipeline,
        store,
        cache,
        variants,
        origin,
        kv,
        db,
        page,
        refresh_rx,
    }
}

/// A GET request with `Host: localhost`.
pub fn get_request(uri: &str) -> Request {
    let mut request = Request::new(Method::Get, uri);
    request.headers.set("host", "localhost");
    request
}

/// A 200 origin response with the given body, cache directive and
/// cookie-variance list.
pub fn origin_response(body: &str, max_age: Option<u64>, vary: &str) -> Response {
    let mut response = Response::with_body(200, body.to_string());
    if let Some(age) = max_age {
        response.headers.set(CACHE_HEADER, format!("max-age={age}"));
    }
    response.headers.set(COOKIES_HEADER, vary);
    response
}
