// src/core/elements/page.rs

//! The `page` element kind: whole-response caching of origin pages, variant
//! keying, the freshness state machine, and cacheability policy.

use crate::core::TwiceError;
use crate::core::elements::{ElementKind, Freshness};
use crate::core::protocol::{Method, Request, Response};
use crate::core::purge::VariantIndex;
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::element::{Element, KIND_PAGE, PageEntry, now_secs};
use crate::upstream::Origin;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Statuses that are never cached.
const UNCACHEABLE_STATUS: &[u16] = &[500, 502, 503, 504, 307];
/// Statuses cached briefly regardless of the origin's directive.
const SHORT_CACHE_STATUS: &[u16] = &[404, 304];
const SHORT_CACHE_TTL: u64 = 30;

/// How long past its TTL an entry is kept in the backend, so stale serving
/// can still find it.
const GRACE_PERIOD: u64 = 86_400;
/// Soft-stale window: this many multiples of the original TTL past expiry.
const STALE_FACTOR: u64 = 3;

/// Headers that are connection-scoped and must not be forwarded upstream.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
];

/// Classifies a cached page against the freshness timeline. The three
/// regions partition it exactly: fresh up to expiry, soft-stale for
/// `STALE_FACTOR` TTLs past it, hard-stale beyond.
pub fn classify(now: u64, expires_on: u64, cache_control: u64) -> Freshness {
    if now <= expires_on {
        Freshness::Fresh
    } else if now <= expires_on + STALE_FACTOR * cache_control {
        Freshness::SoftStale
    } else {
        Freshness::HardStale
    }
}

/// Whether (and for how long) an origin response may enter the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Store { ttl: u64 },
    Bypass,
}

pub fn cache_decision(method: Method, status: u16, max_age: Option<u64>) -> CacheDecision {
    if method != Method::Get {
        return CacheDecision::Bypass;
    }
    if UNCACHEABLE_STATUS.contains(&status) {
        return CacheDecision::Bypass;
    }
    if SHORT_CACHE_STATUS.contains(&status) {
        return CacheDecision::Store {
            ttl: SHORT_CACHE_TTL,
        };
    }
    match max_age {
        Some(n) if n > 0 => CacheDecision::Store { ttl: n },
        _ => CacheDecision::Bypass,
    }
}

/// Parses the origin's cookie-variance header into the sorted cookie-name
/// list used for variant keying.
pub fn declared_cookies(header_value: &str) -> Vec<String> {
    let mut cookies: Vec<String> = header_value
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    cookies.sort();
    cookies
}

#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Header carrying the origin's cache directive (`max-age=N`).
    pub cache_header: String,
    /// Header carrying the origin's cookie-variance list.
    pub cookies_header: String,
    /// Loop-prevention header set on upstream requests.
    pub twice_header: String,
    /// Whether the page key varies on the request language.
    pub lang_enabled: bool,
    pub lang_default: String,
}

/// The `page` element kind.
pub struct PageElement {
    origin: Arc<dyn Origin>,
    cache: Arc<dyn CacheBackend>,
    variants: Arc<VariantIndex>,
    config: PageConfig,
}

impl PageElement {
    pub fn new(
        origin: Arc<dyn Origin>,
        cache: Arc<dyn CacheBackend>,
        variants: Arc<VariantIndex>,
        config: PageConfig,
    ) -> Self {
        Self {
            origin,
            cache,
            variants,
            config,
        }
    }

    /// Derives the page key for a request, salted with the values of the
    /// given (already sorted) cookie names.
    pub fn hash_with_cookies(&self, request: &Request, cookies: &[String]) -> String {
        let host = request
            .header("x-real-host")
            .or_else(|| request.header("host"))
            .unwrap_or("");
        let mut key = format!("{KIND_PAGE}_{host}{}", request.uri);

        // Internationalization salt.
        if self.config.lang_enabled {
            let header = request
                .header("accept-language")
                .unwrap_or(&self.config.lang_default);
            let lang = header
                .replace(' ', "")
                .split(';')
                .next()
                .and_then(|part| part.split(',').next())
                .unwrap_or("")
                .to_ascii_lowercase();
            if !lang.is_empty() {
                key.push_str("//");
                key.push_str(&lang);
            }
        }

        // Values of the cookies the origin declared as varying.
        let found: Vec<String> = cookies
            .iter()
            .filter_map(|name| {
                request
                    .cookie(name)
                    .map(|value| format!("{name}={value}"))
            })
            .collect();
        if !found.is_empty() {
            key.push_str("//");
            key.push_str(&found.join(","));
        }

        key
    }

    /// Builds the upstream request: a clone with hop-by-hop headers and
    /// client cache directives stripped, and the loop-prevention header set.
    fn prepare_upstream(&self, request: &Request) -> Request {
        let mut upstream = request.clone();
        for header in HOP_BY_HOP_HEADERS {
            upstream.headers.remove(header);
        }
        upstream.headers.remove("cache-control");
        upstream.headers.set(&self.config.twice_header, "true");
        upstream
    }

    /// Post-processes an origin response: records the variant, decides
    /// cacheability, and writes the entry through to the cache backend.
    pub async fn extract(&self, response: &Response, request: &Request) -> Element {
        let cookies =
            declared_cookies(response.header(&self.config.cookies_header).unwrap_or(""));
        let key = self.hash_with_cookies(request, &cookies);

        if self.variants.insert(&request.uri, &key) {
            debug!("Added new variant for {}: {}", request.uri, key);
        }

        let decision = cache_decision(
            request.method,
            response.status,
            response.max_age(&self.config.cache_header),
        );
        let cache_control = match decision {
            CacheDecision::Store { ttl } if SHORT_CACHE_STATUS.contains(&response.status) => {
                info!("SHORT-CACHE (Status is {}) [{key}]", response.status);
                ttl
            }
            CacheDecision::Store { ttl } => {
                info!("CACHE [{key}] (for {ttl}s)");
                ttl
            }
            CacheDecision::Bypass if request.method != Method::Get => {
                info!("NO-CACHE (Method is {}) [{key}]", request.method.as_str());
                0
            }
            CacheDecision::Bypass if UNCACHEABLE_STATUS.contains(&response.status) => {
                info!("NO-CACHE (Status is {}) [{key}]", response.status);
                0
            }
            CacheDecision::Bypass => {
                info!("NO-CACHE (No cache data) [{key}]");
                0
            }
        };

        let now = now_secs();
        let mut entry = PageEntry::from_response(response, now + cache_control, cache_control);

        if let CacheDecision::Store { ttl } = decision {
            // One user's cookies must never reach another from the cache.
            entry.set_cookies.clear();
            let entries = HashMap::from([(key.clone(), Element::Page(entry.clone()))]);
            if let Err(e) = self.cache.set(entries, ttl + GRACE_PERIOD).await {
                warn!("Failed to store page [{key}]: {e}");
            }
        }

        Element::Page(entry)
    }
}

#[async_trait]
impl ElementKind for PageElement {
    fn kind(&self) -> &'static str {
        KIND_PAGE
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn hash(&self, request: &Request, _id: Option<&str>) -> Option<String> {
        Some(self.hash_with_cookies(request, &[]))
    }

    async fn fetch(&self, request: &Request, _id: &str) -> Result<Element, TwiceError> {
        let upstream = self.prepare_upstream(request);
        let response = self.origin.fetch(upstream).await.map_err(|e| {
            warn!("ERROR: Could not retrieve [{}]: {e}", request.uri);
            e
        })?;
        Ok(self.extract(&response, request).await)
    }

    fn validate(&self, now: u64, cached: &Element) -> Freshness {
        match cached {
            Element::Page(entry) => classify(now, entry.expires_on, entry.cache_control),
            _ => Freshness::Fresh,
        }
    }
}

impl std::fmt::Debug for PageElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageElement")
            .field("config", &self.config)
            .finish()
    }
}
