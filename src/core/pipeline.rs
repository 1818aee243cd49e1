// src/core/pipeline.rs

//! The request pipeline: intake, prefetch, cookie-variant reconciliation,
//! marker scan, fragment fetch, and render.

use crate::core::elements::{PageElement, declared_cookies};
use crate::core::protocol::{Request, Response};
use crate::core::purge::PurgeHandler;
use crate::core::storage::element::{
    Element, FragmentValue, KIND_PAGE, KIND_SESSION, element_id, element_type, PageEntry,
};
use crate::core::store::{DataStore, PREFETCH_KINDS};
use crate::core::template::{self, FragmentMap, SideEffect};
use bytes::Bytes;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const VIA_VALUE: &str = "Twice 0.1";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Header whose presence routes a request to the purge handler.
    pub purge_header: String,
    /// Internal headers stripped from every outgoing response.
    pub cache_header: String,
    pub twice_header: String,
    pub cookies_header: String,
    /// Optional static override for the effective host.
    pub rewrite_host: Option<String>,
}

/// Drives one client request from intake to rendered response.
pub struct Pipeline {
    store: Arc<DataStore>,
    page: Arc<PageElement>,
    purge: PurgeHandler,
    template: Regex,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<DataStore>,
        page: Arc<PageElement>,
        purge: PurgeHandler,
        template: Regex,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            page,
            purge,
            template,
            config,
        }
    }

    /// Main request handler.
    pub async fn handle(&self, mut request: Request) -> Response {
        // Out-of-band purge requests bypass the pipeline entirely.
        if let Some(kind) = request.header(&self.config.purge_header) {
            let kind = kind.to_string();
            return self.purge.handle(&request, &kind).await;
        }

        // Liveness probe.
        if request.uri.contains("live/time") {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            return Response::with_body(200, format!("{now}"));
        }

        // Overwrite the host field so hashing and forwarding agree on it.
        let real_host = self
            .config
            .rewrite_host
            .clone()
            .or_else(|| request.header("x-real-host").map(String::from));
        if let Some(host) = real_host {
            request.headers.set("host", host);
        }

        // Prefetch: the page plus every configured prefetch kind.
        let page_key = self.page.hash_with_cookies(&request, &[]);
        let mut keys = vec![page_key.clone()];
        for kind in PREFETCH_KINDS {
            if let Some(key) = self.store.registry().hash(&request, kind, None) {
                keys.push(key);
            }
        }
        info!("PREFETCH: {keys:?}");
        let mut elements = self.store.get(&keys, &request).await;

        // Variant reconciliation: if the origin declared cookie variance,
        // the key we fetched under may not be the variant that applies.
        let mut active_key = page_key.clone();
        if let Some(entry) = elements.get(&page_key).and_then(Element::as_page) {
            let declared =
                declared_cookies(entry.header(&self.config.cookies_header).unwrap_or(""));
            let wanted_key = self.page.hash_with_cookies(&request, &declared);
            if wanted_key != page_key {
                debug!("Re-keying {page_key} -> {wanted_key}");
                let corrected = self
                    .store
                    .get(std::slice::from_ref(&wanted_key), &request)
                    .await;
                elements.extend(corrected);
                active_key = wanted_key;
            }
        }

        // One reconciliation fetch only; if it failed, fall back to the
        // page fetched under the original key.
        let page_entry = elements
            .get(&active_key)
            .or_else(|| elements.get(&page_key))
            .and_then(Element::as_page)
            .cloned();
        let Some(page_entry) = page_entry else {
            warn!("No page element for [{}], answering 502", request.uri);
            return Response::new(502);
        };

        // Scan the body for fragment markers we do not have in hand yet.
        let body = String::from_utf8_lossy(&page_entry.body).into_owned();
        let logged_in = is_logged_in(&elements);
        let missing = self.scan_missing(&body, &request, &elements, logged_in);
        if !missing.is_empty() {
            let fetched = self.store.get(&missing, &request).await;
            elements.extend(fetched);
        }

        // Render against the per-request fragment map.
        let mut fragments = build_fragment_map(&elements);
        let (rendered, effects) = template::render(&self.template, &body, &mut fragments);
        self.apply_side_effects(effects);

        let response = self.finish_response(&page_entry, rendered);
        info!(
            "RENDER [{}] ({:.3}s after request received)",
            request.uri,
            request.received_on.elapsed().as_secs_f64()
        );
        response
    }

    /// Collects the deduplicated fragment keys referenced by markers that
    /// are not already in hand. Kinds gated on a session are skipped for
    /// logged-out requests.
    fn scan_missing(
        &self,
        body: &str,
        request: &Request,
        elements: &HashMap<String, Element>,
        logged_in: bool,
    ) -> Vec<String> {
        let mut missing = Vec::new();
        for caps in self.template.captures_iter(body) {
            let Some(payload) = caps.get(1) else { continue };
            let tokens: Vec<&str> = payload.as_str().split_whitespace().collect();
            let (target, id) = match tokens.as_slice() {
                [_command, target, id, ..] => (*target, *id),
                _ => continue,
            };
            let target = target.to_ascii_lowercase();
            if target == KIND_PAGE || target == KIND_SESSION {
                continue;
            }
            // Unknown kinds produce no key and are left to the evaluator's
            // fail-open path.
            let Some(kind) = self.store.registry().get(&target) else {
                continue;
            };
            if kind.requires_session() && !logged_in {
                continue;
            }
            let Some(key) = kind.hash(request, Some(id)) else {
                continue;
            };
            if !elements.contains_key(&key) && !missing.contains(&key) {
                missing.push(key);
            }
        }
        missing
    }

    /// Applies template side effects fire-and-forget; their completions
    /// update the cached fragment copies but never delay the response.
    fn apply_side_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            let (kind_name, op) = match &effect {
                SideEffect::Incr { kind, .. } => (kind.clone(), "incr"),
                SideEffect::Decr { kind, .. } => (kind.clone(), "decr"),
                SideEffect::Set { kind, .. } => (kind.clone(), "set"),
            };
            let Some(kind) = self.store.registry().get(&kind_name).cloned() else {
                warn!("Side effect against unknown kind '{kind_name}'");
                continue;
            };
            tokio::spawn(async move {
                let result = match effect {
                    SideEffect::Incr { id, .. } => kind.incr(&id).await,
                    SideEffect::Decr { id, .. } => kind.decr(&id).await,
                    SideEffect::Set { id, value, .. } => kind.set_value(&id, &value).await,
                };
                if let Err(e) = result {
                    warn!("Side effect {op} failed: {e}");
                }
            });
        }
    }

    /// Rewrites headers on a copy of the cached response and installs the
    /// rendered body.
    fn finish_response(&self, entry: &PageEntry, rendered: String) -> Response {
        let mut response = entry.to_response();
        response.body = Bytes::from(rendered.into_bytes());
        response
            .headers
            .set("content-length", response.body.len().to_string());
        response.headers.set("connection", "close");
        response.headers.set("via", VIA_VALUE);
        // The internal cache/variance/control headers stay inside the proxy.
        response.headers.remove(&self.config.cache_header);
        response.headers.remove(&self.config.twice_header);
        response.headers.remove(&self.config.cookies_header);
        response
    }
}

/// A request counts as logged in when a session element is in hand and its
/// fetch found an actual row.
fn is_logged_in(elements: &HashMap<String, Element>) -> bool {
    elements.iter().any(|(key, element)| {
        element_type(key) == KIND_SESSION
            && element
                .as_fragment()
                .is_some_and(|fragment| !fragment.is_absent())
    })
}

/// Folds fetched elements into the kind -> field -> value map the
/// evaluator consumes. Session records contribute their fields; scalar
/// fragments contribute under their element id.
fn build_fragment_map(elements: &HashMap<String, Element>) -> FragmentMap {
    let mut fragments = FragmentMap::new();
    for (key, element) in elements {
        let kind = element_type(key);
        match element {
            Element::Fragment(FragmentValue::Record(fields)) if kind == KIND_SESSION => {
                for (field, value) in fields {
                    fragments.insert(KIND_SESSION, field, value.clone());
                }
            }
            Element::Fragment(FragmentValue::Scalar(value)) => {
                fragments.insert(kind, element_id(key), value.clone());
            }
            _ => {}
        }
    }
    fragments
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish()
    }
}
