// src/core/protocol/mod.rs

//! The HTTP/1.0 framing layer: `Request` and `Response` values plus the
//! `tokio_util::codec` implementations that move them across the wire.

mod http_codec;
mod http_message;

pub use http_codec::{RequestCodec, ResponseCodec};
pub use http_message::{Headers, Method, Request, Response, reason_phrase};
