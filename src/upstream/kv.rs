// src/upstream/kv.rs

//! A pooled client for the memcached text protocol.
//!
//! The pool holds a fixed number of lazily-dialed connections to a single
//! endpoint; each operation picks one uniformly at random and holds it for
//! the duration of the round trip. A failed connection is dropped and
//! redialed on next use, without affecting the rest of the pool.

use crate::core::TwiceError;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

type Conn = BufStream<TcpStream>;

/// A fixed-size connection pool to one K/V endpoint.
pub struct KvPool {
    addr: String,
    conns: Vec<Mutex<Option<Conn>>>,
}

impl KvPool {
    pub fn new(addr: impl Into<String>, pool_size: usize) -> Self {
        let size = pool_size.max(1);
        Self {
            addr: addr.into(),
            conns: (0..size).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Random load balancing across the connection pool.
    fn slot(&self) -> &Mutex<Option<Conn>> {
        let index = rand::thread_rng().gen_range(0..self.conns.len());
        &self.conns[index]
    }

    async fn ensure<'a>(
        guard: &'a mut Option<Conn>,
        addr: &str,
    ) -> Result<&'a mut Conn, TwiceError> {
        if guard.is_none() {
            debug!("Dialing kv upstream at {addr}");
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| TwiceError::UpstreamUnavailable(format!("kv {addr}: {e}")))?;
            *guard = Some(BufStream::new(stream));
        }
        Ok(guard.as_mut().expect("connection was just established"))
    }

    async fn read_reply_line(conn: &mut Conn) -> Result<String, TwiceError> {
        let mut line = String::new();
        let n = conn.read_line(&mut line).await?;
        if n == 0 {
            return Err(TwiceError::UpstreamUnavailable(
                "kv connection closed".to_string(),
            ));
        }
        Ok(line.trim_end().to_string())
    }

    /// Batched get. Missing keys are simply absent from the result;
    /// the value carries the stored flags alongside the payload.
    pub async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, (u32, Bytes)>, TwiceError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut guard = self.slot().lock().await;
        let result = Self::do_get(&mut guard, &self.addr, keys).await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn do_get(
        guard: &mut Option<Conn>,
        addr: &str,
        keys: &[String],
    ) -> Result<HashMap<String, (u32, Bytes)>, TwiceError> {
        let conn = Self::ensure(guard, addr).await?;
        conn.write_all(format!("get {}\r\n", keys.join(" ")).as_bytes())
            .await?;
        conn.flush().await?;

        let mut output = HashMap::new();
        loop {
            let line = Self::read_reply_line(conn).await?;
            if line == "END" {
                break;
            }
            let mut parts = line.split_whitespace();
            if parts.next() != Some("VALUE") {
                return Err(TwiceError::Protocol(format!("unexpected kv reply: [{line}]")));
            }
            let key = parts
                .next()
                .ok_or_else(|| TwiceError::Protocol("kv VALUE without key".to_string()))?
                .to_string();
            let flags: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            let len: usize = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| TwiceError::Protocol("kv VALUE without length".to_string()))?;

            // Payload is followed by a trailing CRLF.
            let mut data = vec![0u8; len + 2];
            conn.read_exact(&mut data).await?;
            data.truncate(len);
            output.insert(key, (flags, Bytes::from(data)));
        }
        Ok(output)
    }

    pub async fn get(&self, key: &str) -> Result<Option<(u32, Bytes)>, TwiceError> {
        let keys = [key.to_string()];
        let mut result = self.get_many(&keys).await?;
        Ok(result.remove(key))
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<(), TwiceError> {
        let mut guard = self.slot().lock().await;
        let result = async {
            let conn = Self::ensure(&mut guard, &self.addr).await?;
            conn.write_all(
                format!("set {key} 0 {ttl_seconds} {}\r\n", value.len()).as_bytes(),
            )
            .await?;
            conn.write_all(value).await?;
            conn.write_all(b"\r\n").await?;
            conn.flush().await?;
            let line = Self::read_reply_line(conn).await?;
            if line != "STORED" {
                return Err(TwiceError::Protocol(format!("kv set failed: [{line}]")));
            }
            Ok(())
        }
        .await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    async fn arith(&self, op: &str, key: &str, delta: u64) -> Result<Option<u64>, TwiceError> {
        let mut guard = self.slot().lock().await;
        let result = async {
            let conn = Self::ensure(&mut guard, &self.addr).await?;
            conn.write_all(format!("{op} {key} {delta}\r\n").as_bytes()).await?;
            conn.flush().await?;
            let line = Self::read_reply_line(conn).await?;
            if line == "NOT_FOUND" {
                return Ok(None);
            }
            line.parse::<u64>()
                .map(Some)
                .map_err(|_| TwiceError::Protocol(format!("kv {op} reply: [{line}]")))
        }
        .await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    pub async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, TwiceError> {
        self.arith("incr", key, delta).await
    }

    pub async fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>, TwiceError> {
        self.arith("decr", key, delta).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), TwiceError> {
        let mut guard = self.slot().lock().await;
        let result = async {
            let conn = Self::ensure(&mut guard, &self.addr).await?;
            conn.write_all(format!("delete {key}\r\n").as_bytes()).await?;
            conn.flush().await?;
            // DELETED or NOT_FOUND are both fine.
            Self::read_reply_line(conn).await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    pub async fn flush_all(&self) -> Result<(), TwiceError> {
        let mut guard = self.slot().lock().await;
        let result = async {
            let conn = Self::ensure(&mut guard, &self.addr).await?;
            conn.write_all(b"flush_all\r\n").await?;
            conn.flush().await?;
            Self::read_reply_line(conn).await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            *guard = None;
        }
        result
    }
}

impl std::fmt::Debug for KvPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvPool")
            .field("addr", &self.addr)
            .field("pool_size", &self.conns.len())
            .finish()
    }
}

/// The fragment-facing view of the K/V upstream: what the `memcache`
/// element kind needs, no more.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Bytes>, TwiceError>;
    async fn set(&self, id: &str, value: &[u8]) -> Result<(), TwiceError>;
    async fn incr(&self, id: &str) -> Result<Option<u64>, TwiceError>;
    async fn decr(&self, id: &str) -> Result<Option<u64>, TwiceError>;
}

#[async_trait]
impl KvStore for KvPool {
    async fn get(&self, id: &str) -> Result<Option<Bytes>, TwiceError> {
        Ok(KvPool::get(self, id).await?.map(|(_, value)| value))
    }

    async fn set(&self, id: &str, value: &[u8]) -> Result<(), TwiceError> {
        KvPool::set(self, id, value, 0).await
    }

    async fn incr(&self, id: &str) -> Result<Option<u64>, TwiceError> {
        KvPool::incr(self, id, 1).await
    }

    async fn decr(&self, id: &str) -> Result<Option<u64>, TwiceError> {
        KvPool::decr(self, id, 1).await
    }
}
