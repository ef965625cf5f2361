//! # cw-md
//!
//! Candle market-data modules for Binance and Bittrex.
//!
//! ## Architecture
//!
//! Each exchange implements [`protocol::StreamProtocol`] (endpoint, handshake,
//! frame decoding). The generic [`session::StreamSession`] plans symbol
//! batches, runs one supervised connection per batch and merges decoded
//! candles into the shared store through [`candle_store::CandleStore`].
//!
//! ## Shared infrastructure
//!
//! - [`planner`] — symbol batching
//! - [`decoder`] — `WireEvent` / `DecodeError` contract
//! - [`symbols`] — raw symbol → base/quote lookup
//! - [`registry`] — per-exchange factories
//! - [`commands`] — run-mode table
//! - [`json_util`] — JSON parsing helpers

pub mod binance;
pub mod bittrex;
pub mod candle_store;
pub mod commands;
pub mod context;
pub mod decoder;
pub mod json_util;
pub mod planner;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod symbols;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use async_trait::async_trait;

/// Trait implemented by all market data modules.
///
/// Only `Send` is required (not `Sync`) because modules are accessed
/// sequentially by the runner, never concurrently.
#[async_trait]
pub trait MdModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Connect and begin processing market data.
    async fn start(&mut self) -> Result<()>;
    /// Gracefully stop all connections and tasks.
    async fn stop(&mut self) -> Result<()>;
}
