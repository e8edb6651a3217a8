//! Transport seam between a [`SessionConnection`](super::connection::SessionConnection)
//! and the socket it drives.
//!
//! A transport only knows how to open a link: a sink of outbound text frames
//! and a stream of inbound ones. Lifecycle, state and event ordering live in
//! the connection, so tests can swap in an in-memory link.

use std::pin::Pin;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

use crate::config::RelayEndpoint;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("timed out connecting to relay")]
    Timeout,
    #[error("websocket error: {0}")]
    Socket(Box<tungstenite::Error>),
    #[error("transport closed")]
    Closed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Socket(Box::new(error))
    }
}

/// Both halves of an open relay link.
pub struct TransportLink {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a link to the relay at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the relay cannot be reached.
    async fn open(&self, endpoint: &RelayEndpoint) -> Result<TransportLink, TransportError>;
}

/// Websocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &RelayEndpoint) -> Result<TransportLink, TransportError> {
        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|error| TransportError::Connect(Box::new(error)))?;
        debug!(%endpoint, "websocket handshake complete");

        let (write, read) = socket.split();
        let sink = write.with(|frame: String| future::ready(Ok::<_, TransportError>(Message::text(frame))));
        let stream = read.filter_map(|message| future::ready(inbound_text(message)));

        Ok(TransportLink { sink: Box::pin(sink), stream: Box::pin(stream) })
    }
}

/// Map one websocket message to an inbound text frame, skipping control frames.
fn inbound_text(message: Result<Message, tungstenite::Error>) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(_) => {
                warn!(len = bytes.len(), "dropping non-utf8 binary frame");
                None
            }
        },
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_)) => None,
        Err(error) => Some(Err(TransportError::from(error))),
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
