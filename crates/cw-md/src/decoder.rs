//! Wire decoding contract shared by the exchange protocols.
//!
//! A decoder turns one inbound text frame into zero or more [`WireEvent`]s.
//! Decoding never panics and never tears down a connection: a frame that
//! cannot be interpreted yields a [`DecodeError`], which the session logs
//! before dropping the frame.

use cw_core::RawCandle;
use thiserror::Error;

/// One meaningful item extracted from a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// A candle delta, still keyed by the exchange's raw symbol.
    Candle(RawCandle),
    /// Positive acknowledgement of a subscribe request.
    SubscribeAck { id: Option<u64> },
    /// Server heartbeat; only refreshes liveness.
    Heartbeat,
    /// The server asks the client to re-authenticate soon.
    AuthExpiring,
    /// Response to a hub invocation.
    InvocationResult { id: u64, result: Result<serde_json::Value, String> },
    /// Understood but irrelevant (keep-alives, init frames, other channels).
    Ignored,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is neither raw deflate nor zlib: {0}")]
    Decompress(std::io::Error),

    #[error("missing or malformed field '{0}'")]
    Field(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Exchange-specific frame decoder.
pub trait WireDecoder: Send + Sync {
    fn decode(&self, frame: &str) -> Result<Vec<WireEvent>, DecodeError>;
}
