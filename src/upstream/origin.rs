// src/upstream/origin.rs

//! The origin HTTP client: one plaintext HTTP/1.0 exchange per fetch, with a
//! per-fetch deadline from config. The trait seam exists so the pipeline and
//! element tests can substitute a scripted origin.

use crate::core::TwiceError;
use crate::core::protocol::{Request, Response, ResponseCodec};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// A source of origin responses.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Sends the (already prepared) upstream request and awaits the response.
    async fn fetch(&self, request: Request) -> Result<Response, TwiceError>;
}

/// The production origin client: dial, send, read one response, hang up.
#[derive(Debug)]
pub struct HttpOrigin {
    addr: String,
    deadline: Duration,
}

impl HttpOrigin {
    pub fn new(addr: impl Into<String>, deadline: Duration) -> Self {
        Self {
            addr: addr.into(),
            deadline,
        }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, request: Request) -> Result<Response, TwiceError> {
        let uri = request.uri.clone();
        let exchange = async {
            let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
                TwiceError::UpstreamUnavailable(format!("origin {}: {e}", self.addr))
            })?;
            let mut framed = Framed::new(stream, ResponseCodec);
            framed.send(request).await?;
            match framed.next().await {
                Some(Ok(response)) => Ok(response),
                Some(Err(e)) => Err(e),
                None => Err(TwiceError::UpstreamUnavailable(
                    "origin closed without a response".to_string(),
                )),
            }
        };
        timeout(self.deadline, exchange)
            .await
            .map_err(|_| TwiceError::UpstreamTimeout(format!("origin fetch for {uri}")))?
    }
}
