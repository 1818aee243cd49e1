// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a
//! client connection: one request in, one response out, then close
//! (HTTP/1.0 semantics).

use crate::core::TwiceError;
use crate::core::pipeline::Pipeline;
use crate::core::protocol::{Request, RequestCodec, Response};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Handles one accepted client socket.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, RequestCodec>,
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        pipeline: Arc<Pipeline>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed: Framed::new(socket, RequestCodec),
            addr,
            pipeline,
            shutdown_rx,
        }
    }

    /// Reads one request, dispatches it, writes the response, and closes.
    pub async fn run(mut self) -> Result<(), TwiceError> {
        let frame = tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => {
                debug!("Connection handler for {} received shutdown signal.", self.addr);
                None
            }
            frame = self.framed.next() => frame,
        };

        match frame {
            Some(Ok(request)) => self.dispatch(request).await?,
            Some(Err(e @ (TwiceError::Protocol(_) | TwiceError::UnsupportedMethod(_)))) => {
                warn!("Bad request from {}: {e}", self.addr);
                let _ = self.framed.send(Response::new(400)).await;
            }
            Some(Err(e)) => return Err(e),
            // Client hung up before sending a full request, or shutdown won.
            None => {}
        }

        let mut stream = self.framed.into_inner();
        let _ = stream.shutdown().await;
        Ok(())
    }

    async fn dispatch(&mut self, request: Request) -> Result<(), TwiceError> {
        let response = self.pipeline.handle(request).await;
        self.framed.send(response).await
    }
}
