// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the proxy.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum TwiceError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported method '{0}'")]
    UnsupportedMethod(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown element kind '{0}'")]
    UnknownElementKind(String),

    #[error("Operation not supported by element kind '{0}'")]
    UnsupportedOperation(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for TwiceError {
    fn clone(&self) -> Self {
        match self {
            TwiceError::Io(e) => TwiceError::Io(Arc::clone(e)),
            TwiceError::IncompleteData => TwiceError::IncompleteData,
            TwiceError::Protocol(s) => TwiceError::Protocol(s.clone()),
            TwiceError::UnsupportedMethod(s) => TwiceError::UnsupportedMethod(s.clone()),
            TwiceError::UpstreamUnavailable(s) => TwiceError::UpstreamUnavailable(s.clone()),
            TwiceError::UpstreamTimeout(s) => TwiceError::UpstreamTimeout(s.clone()),
            TwiceError::CacheBackend(s) => TwiceError::CacheBackend(s.clone()),
            TwiceError::Database(s) => TwiceError::Database(s.clone()),
            TwiceError::UnknownElementKind(s) => TwiceError::UnknownElementKind(s.clone()),
            TwiceError::UnsupportedOperation(s) => TwiceError::UnsupportedOperation(s),
            TwiceError::Internal(s) => TwiceError::Internal(s.clone()),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for TwiceError {
    fn from(e: std::io::Error) -> Self {
        TwiceError::Io(Arc::new(e))
    }
}

impl From<sqlx::Error> for TwiceError {
    fn from(e: sqlx::Error) -> Self {
        TwiceError::Database(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for TwiceError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        TwiceError::Protocol(format!("invalid utf-8: {e}"))
    }
}

impl From<bincode::error::EncodeError> for TwiceError {
    fn from(e: bincode::error::EncodeError) -> Self {
        TwiceError::CacheBackend(format!("encode: {e}"))
    }
}

impl From<bincode::error::DecodeError> for TwiceError {
    fn from(e: bincode::error::DecodeError) -> Self {
        TwiceError::CacheBackend(format!("decode: {e}"))
    }
}
