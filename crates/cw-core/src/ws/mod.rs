//! WebSocket transport used by streaming sessions.

pub mod client;

use async_trait::async_trait;

use crate::error::CwError;

pub use client::{TungsteniteConnector, WsTransport};

/// Inbound event observed on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame (binary frames are delivered if they are valid UTF-8).
    Frame(String),
    /// The peer closed the connection or the stream ended.
    Closed,
    /// A read failure. The connection is unusable afterwards.
    Error(String),
}

/// A connected, bidirectional message transport.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), CwError>;

    /// Next application-level event. Control frames are handled internally.
    async fn recv(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

/// Opens transports. Sessions depend on this seam so they can be driven by
/// scripted transports in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<Box<dyn Transport>, CwError>;
}
