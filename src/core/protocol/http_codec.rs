// src/core/protocol/http_codec.rs

//! `Encoder`/`Decoder` implementations for HTTP/1.0 framing.
//!
//! `RequestCodec` is the server side (decode `Request`, encode `Response`);
//! `ResponseCodec` is the client side used for origin fetches. Bodies are
//! delimited by `Content-Length`; an origin response without one is read to
//! EOF (the origin closes the connection after each response).

use crate::core::TwiceError;
use crate::core::protocol::http_message::{
    Headers, Method, Request, Response, reason_phrase,
};
use bytes::{Buf, Bytes, BytesMut};
use std::time::Instant;
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

// Protocol-level limits to prevent denial-of-service from malformed peers.
const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const MAX_BODY_SIZE: usize = 64 * 1024 * 1024; // 64MB

/// Locates the end of the header section (`\r\n\r\n`), if present.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parsed header section shared by requests and responses: plain headers,
/// request cookies, and response set-cookies are separated here.
struct ParsedHead {
    headers: Headers,
    cookies: Vec<String>,
    set_cookies: Vec<String>,
    /// `None` when the header is absent, which for responses means the body
    /// is delimited by connection close.
    content_length: Option<usize>,
}

fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<ParsedHead, TwiceError> {
    let mut headers = Headers::new();
    let mut cookies = Vec::new();
    let mut set_cookies = Vec::new();
    let mut count = 0usize;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        count += 1;
        if count > MAX_HEADERS {
            return Err(TwiceError::Protocol("too many headers".to_string()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| TwiceError::Protocol(format!("bad header line: [{line}]")))?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("cookie") {
            cookies.extend(value.split("; ").map(|c| c.to_string()));
        } else if name.eq_ignore_ascii_case("set-cookie") {
            set_cookies.push(value.to_string());
        } else {
            headers.set(name, value);
        }
    }

    let content_length = match headers.get("content-length") {
        Some(v) => Some(
            v.trim()
                .parse::<usize>()
                .map_err(|_| TwiceError::Protocol(format!("bad content-length: [{v}]")))?,
        ),
        None => None,
    };
    if content_length.unwrap_or(0) > MAX_BODY_SIZE {
        return Err(TwiceError::Protocol("body too large".to_string()));
    }

    Ok(ParsedHead {
        headers,
        cookies,
        set_cookies,
        content_length,
    })
}

fn write_headers(headers: &Headers, dst: &mut BytesMut) {
    for (name, value) in headers.iter() {
        dst.extend_from_slice(name.as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(CRLF);
    }
}

/// Server-side codec: decodes client `Request`s and encodes `Response`s.
#[derive(Debug, Default)]
pub struct RequestCodec;

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = TwiceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, Self::Error> {
        let Some(head_end) = find_head_end(src) else {
            if src.len() > MAX_HEAD_SIZE {
                return Err(TwiceError::Protocol("header section too large".to_string()));
            }
            return Ok(None);
        };

        let head = std::str::from_utf8(&src[..head_end])
            .map_err(|_| TwiceError::Protocol("non-utf8 header section".to_string()))?;
        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .ok_or_else(|| TwiceError::Protocol("empty request".to_string()))?;
        let mut parts = request_line.split_whitespace();
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(u), Some(v)) => (Method::parse(m)?, u.to_string(), v.to_string()),
            _ => {
                return Err(TwiceError::Protocol(format!(
                    "bad request line: [{request_line}]"
                )));
            }
        };
        let parsed = parse_header_lines(lines)?;
        let content_length = parsed.content_length.unwrap_or(0);

        let total = head_end + 4 + content_length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(head_end + 4);
        let body = src.split_to(content_length).freeze();

        Ok(Some(Request {
            method,
            uri,
            version,
            headers: parsed.headers,
            cookies: parsed.cookies,
            body,
            received_on: Instant::now(),
        }))
    }
}

impl Encoder<Response> for RequestCodec {
    type Error = TwiceError;

    fn encode(&mut self, mut item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.headers.set("content-length", item.body.len().to_string());
        let reason = item
            .reason
            .clone()
            .unwrap_or_else(|| reason_phrase(item.status).to_string());

        dst.extend_from_slice(
            format!("{} {} {}\r\n", item.version, item.status, reason).as_bytes(),
        );
        write_headers(&item.headers, dst);
        for cookie in &item.set_cookies {
            dst.extend_from_slice(b"set-cookie: ");
            dst.extend_from_slice(cookie.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        dst.extend_from_slice(CRLF);
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}

/// Client-side codec used for origin fetches: encodes `Request`s and
/// decodes `Response`s.
#[derive(Debug, Default)]
pub struct ResponseCodec;

impl ResponseCodec {
    fn decode_head(src: &[u8], head_end: usize) -> Result<(Response, Option<usize>), TwiceError> {
        let head = std::str::from_utf8(&src[..head_end])
            .map_err(|_| TwiceError::Protocol("non-utf8 header section".to_string()))?;
        let mut lines = head.split("\r\n");
        let status_line = lines
            .next()
            .ok_or_else(|| TwiceError::Protocol("empty response".to_string()))?;
        let mut parts = status_line.split_whitespace();
        let version = parts
            .next()
            .ok_or_else(|| TwiceError::Protocol("missing protocol version".to_string()))?
            .to_string();
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TwiceError::Protocol(format!("bad status line: [{status_line}]")))?;
        let reason: String = parts.collect::<Vec<_>>().join(" ");
        let parsed = parse_header_lines(lines)?;

        let response = Response {
            status,
            reason: if reason.is_empty() { None } else { Some(reason) },
            version,
            headers: parsed.headers,
            set_cookies: parsed.set_cookies,
            body: Bytes::new(),
        };
        Ok((response, parsed.content_length))
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = TwiceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, Self::Error> {
        let Some(head_end) = find_head_end(src) else {
            if src.len() > MAX_HEAD_SIZE {
                return Err(TwiceError::Protocol("header section too large".to_string()));
            }
            return Ok(None);
        };

        let (mut response, content_length) = Self::decode_head(src, head_end)?;
        // Without a content-length the body runs to EOF; wait for decode_eof.
        let Some(content_length) = content_length else {
            return Ok(None);
        };

        let total = head_end + 4 + content_length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(head_end + 4);
        response.body = src.split_to(content_length).freeze();
        Ok(Some(response))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Response>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        // The peer closed the connection: whatever follows the header
        // section is the complete body.
        let Some(head_end) = find_head_end(src) else {
            return Err(TwiceError::IncompleteData);
        };
        let (mut response, content_length) = Self::decode_head(src, head_end)?;
        if content_length.is_some() {
            // A declared body that never fully arrived.
            return Err(TwiceError::IncompleteData);
        }
        src.advance(head_end + 4);
        response.body = src.split().freeze();
        Ok(Some(response))
    }
}

impl Encoder<Request> for ResponseCodec {
    type Error = TwiceError;

    fn encode(&mut self, mut item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if !item.body.is_empty() {
            item.headers.set("content-length", item.body.len().to_string());
        }
        dst.extend_from_slice(
            format!("{} {} {}\r\n", item.method.as_str(), item.uri, item.version).as_bytes(),
        );
        write_headers(&item.headers, dst);
        if !item.cookies.is_empty() {
            dst.extend_from_slice(b"cookie: ");
            dst.extend_from_slice(item.cookies.join("; ").as_bytes());
            dst.extend_from_slice(CRLF);
        }
        dst.extend_from_slice(CRLF);
        dst.extend_from_slice(&item.body);
        Ok(())
    }
}
