//! Typed error definitions for candlewick.
//!
//! Provides [`CwError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for candlewick.
#[derive(Debug, Error)]
pub enum CwError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Shared-store access error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Market data or REST response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Session authentication error.
    #[error("auth error: {0}")]
    Auth(String),
}

/// Errors raised by a [`SharedStore`](crate::store::SharedStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected the command or the connection failed.
    #[error("backend: {0}")]
    Backend(String),

    /// A stored value could not be interpreted (e.g. a non-numeric TAT).
    #[error("corrupt value at '{key}': {value}")]
    Corrupt { key: String, value: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
