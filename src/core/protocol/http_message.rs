// src/core/protocol/http_message.rs

//! Plain-value HTTP/1.0 request and response types.
//!
//! These are deliberately simple: an ordered, case-insensitive header map,
//! a cookie list kept separate from the other headers, and a byte body.
//! Everything downstream (hashing, caching, templating) works on these
//! values rather than on a socket.

use crate::core::TwiceError;
use bytes::Bytes;
use std::time::Instant;

/// The request methods the proxy accepts. Anything else is rejected with a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
}

impl Method {
    pub fn parse(s: &str) -> Result<Self, TwiceError> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            other => Err(TwiceError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

/// The canonical reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "ERROR",
    }
}

/// An ordered, case-insensitive header map. Names are stored lowercased;
/// insertion order is preserved on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Replaces any existing header of the same name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        self.0.retain(|(k, _)| *k != name);
        self.0.push((name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.set(&k, v);
        }
        headers
    }
}

/// A parsed client (or upstream) request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    /// `name=value[; attrs]` pairs accumulated from `Cookie` headers.
    pub cookies: Vec<String>,
    pub body: Bytes,
    /// When the request was read off the socket, for latency logging.
    pub received_on: Instant,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: "HTTP/1.0".to_string(),
            headers: Headers::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
            received_on: Instant::now(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Looks up a cookie by name, returning its raw value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        for cookie in &self.cookies {
            let pair = cookie.split(';').next().unwrap_or("");
            if let Some((key, value)) = pair.split_once('=')
                && key.trim().eq_ignore_ascii_case(name)
            {
                return Some(value);
            }
        }
        None
    }

    /// The request path: the URI with any query string removed.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }
}

/// A parsed origin (or proxy-generated) response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: Option<String>,
    pub version: String,
    pub headers: Headers,
    /// Raw `Set-Cookie` header values, kept apart so they can be scrubbed
    /// before a page enters the shared cache.
    pub set_cookies: Vec<String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            version: "HTTP/1.0".to_string(),
            headers: Headers::new(),
            set_cookies: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A minimal response with a text body, used for purge acks, liveness
    /// checks and error paths.
    pub fn with_body(status: u16, body: impl Into<Bytes>) -> Self {
        let mut response = Response::new(status);
        response.body = body.into();
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Parses a `max-age=N` directive out of the named cache-control style
    /// header, e.g. `x-twice-control: max-age=60`.
    pub fn max_age(&self, header: &str) -> Option<u64> {
        let value = self.header(header)?;
        for directive in value.split([';', ',']) {
            if let Some((key, val)) = directive.split_once('=')
                && key.trim().eq_ignore_ascii_case("max-age")
            {
                return val.trim().parse().ok();
            }
        }
        None
    }
}
