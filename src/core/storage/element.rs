// src/core/storage/element.rs

//! Defines the values that live in the cache and the `<kind>_<id>` key scheme.

use crate::core::protocol::{Headers, Response};
use bincode::{Decode, Encode};
use std::time::{SystemTime, UNIX_EPOCH};

/// Built-in element kind names. Kind names must never contain an underscore;
/// the first underscore in a key separates the kind from the id.
pub const KIND_PAGE: &str = "page";
pub const KIND_SESSION: &str = "session";
pub const KIND_KV: &str = "memcache";
pub const KIND_DB: &str = "viewdb";

/// The current wall clock in whole seconds since the UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Builds an element key from its kind and id.
pub fn make_key(kind: &str, id: &str) -> String {
    format!("{kind}_{id}")
}

/// The kind portion of an element key: everything before the first underscore.
pub fn element_type(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

/// The id portion of an element key: everything after the first underscore.
pub fn element_id(key: &str) -> &str {
    key.split_once('_').map(|(_, id)| id).unwrap_or("")
}

/// A cached page variant. Immutable once inserted; the pipeline renders from
/// a copy and never writes back into the entry.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct PageEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
    /// Absolute expiry, in seconds since the epoch.
    pub expires_on: u64,
    /// The origin's `max-age` at creation; 0 marks an uncacheable entry.
    pub cache_control: u64,
    /// Reserved for future dependency tracking.
    pub dependencies: Vec<String>,
}

impl PageEntry {
    /// Captures an origin response into a cache entry.
    pub fn from_response(response: &Response, expires_on: u64, cache_control: u64) -> Self {
        Self {
            status: response.status,
            headers: response
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            set_cookies: response.set_cookies.clone(),
            body: response.body.to_vec(),
            expires_on,
            cache_control,
            dependencies: Vec::new(),
        }
    }

    /// Rebuilds a `Response` from the entry. The caller owns the copy and is
    /// free to rewrite headers and substitute the body.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status);
        response.headers = self
            .headers
            .iter()
            .cloned()
            .collect::<Headers>();
        response.set_cookies = self.set_cookies.clone();
        response.body = bytes::Bytes::from(self.body.clone());
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The value of a non-page element.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum FragmentValue {
    /// The authoritative source was consulted and had nothing ("known absent").
    Absent,
    /// A single opaque value, e.g. a K/V lookup result.
    Scalar(String),
    /// A field map, e.g. a session row.
    Record(Vec<(String, String)>),
}

impl FragmentValue {
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            FragmentValue::Record(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FragmentValue::Absent)
    }
}

/// Any value the cache can hold.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Element {
    Page(PageEntry),
    Fragment(FragmentValue),
}

impl Element {
    pub fn as_page(&self) -> Option<&PageEntry> {
        match self {
            Element::Page(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_fragment(&self) -> Option<&FragmentValue> {
        match self {
            Element::Fragment(value) => Some(value),
            _ => None,
        }
    }
}
