//! # cw-core
//!
//! Core crate for candlewick, providing:
//!
//! - **Types** (`types`) — exchanges, candles, symbol pairs
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `CwError` via thiserror
//! - **Shared store** (`store`) — key-value abstraction with Redis and in-memory backends
//! - **Clock** (`clock`) — store-authoritative time source
//! - **Distributed lock** (`lock`) — leased mutual exclusion over the store
//! - **Rate limiting** (`ratelimit`) — GCRA, leaky bucket and sliding window
//! - **WebSocket** (`ws`) — transport used by streaming sessions
//! - **Time utilities** (`time_util`) — local wall-clock timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod ratelimit;
pub mod store;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
