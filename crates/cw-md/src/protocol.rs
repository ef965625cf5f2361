//! Per-exchange streaming protocol seam.
//!
//! A [`StreamProtocol`] knows how to reach an exchange and, once a transport is
//! connected, produces a [`ProtocolLink`] that drives the exchange-specific
//! handshake (authentication, subscription) and turns inbound frames into
//! [`WireEvent`]s. The connection worker in [`crate::session`] owns the state
//! machine and is identical for every exchange.

use anyhow::Result;
use async_trait::async_trait;
use cw_core::Exchange;
use cw_core::ws::Transport;

use crate::decoder::{DecodeError, WireEvent};

/// Where and how to open a websocket for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), headers: Vec::new() }
    }
}

/// Result of the optional authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No credentials configured, or the exchange has no session auth.
    Skipped,
    Authenticated,
    /// The server refused the signature; public channels still work.
    Rejected(String),
}

/// One step of the streaming receive loop.
#[derive(Debug)]
pub enum LinkEvent {
    /// A frame was received; carries its decode outcome.
    Frame(Result<Vec<WireEvent>, DecodeError>),
    Closed,
    Error(String),
}

#[async_trait]
pub trait StreamProtocol: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Resolve the websocket endpoint. May perform a REST negotiation.
    async fn endpoint(&self) -> Result<Endpoint>;

    /// Wrap a freshly connected transport for the given channel batch.
    fn attach(&self, transport: Box<dyn Transport>, endpoint: &Endpoint, batch: &[String]) -> Box<dyn ProtocolLink>;
}

#[async_trait]
pub trait ProtocolLink: Send {
    /// Called once after the transport is connected, before authentication.
    async fn ready(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this exchange has a session authentication step.
    fn has_auth(&self) -> bool {
        false
    }

    /// Signed session authentication. Called again on [`WireEvent::AuthExpiring`].
    async fn authenticate(&mut self) -> Result<AuthOutcome> {
        Ok(AuthOutcome::Skipped)
    }

    /// Subscribe every channel of the batch.
    async fn subscribe(&mut self) -> Result<()>;

    async fn next_event(&mut self) -> LinkEvent;

    async fn close(&mut self);
}
