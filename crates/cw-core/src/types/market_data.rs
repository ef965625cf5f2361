//! Market data structures: the records flowing from decoders to the store.
//!
//! # Timestamp convention
//!
//! Candle timestamps are the candle **open time in milliseconds** since Unix
//! epoch, matching what Binance sends in `k.t`. Bittrex `startsAt` strings are
//! converted to the same unit by the decoder.

use serde::{Deserialize, Serialize};

use super::enums::Exchange;

// ---------------------------------------------------------------------------
// RawCandle — decoder output, still keyed by the exchange's own symbol
// ---------------------------------------------------------------------------

/// A candle update as decoded from the wire, before symbol resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandle {
    /// Exchange-native pair identifier (e.g. `ETHBTC`, `ETH-BTC`).
    pub raw_symbol: String,
    pub timestamp_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Candle — normalized record written to the shared store
// ---------------------------------------------------------------------------

/// One OHLCV candle for a resolved `(exchange, base, quote)` pair.
///
/// Identified by `(exchange, base_id, quote_id, timestamp_ms)`; a later update
/// for the same key replaces the earlier one (exchanges resend the still-open
/// candle repeatedly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub exchange: Exchange,
    pub base_id: String,
    pub quote_id: String,
    pub timestamp_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Attach resolved pair identifiers to a decoded candle.
    pub fn from_raw(exchange: Exchange, base_id: &str, quote_id: &str, raw: &RawCandle) -> Self {
        Self {
            exchange,
            base_id: base_id.to_string(),
            quote_id: quote_id.to_string(),
            timestamp_ms: raw.timestamp_ms,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Candle({} {}/{} t={} o={} h={} l={} c={} v={})",
            self.exchange,
            self.base_id,
            self.quote_id,
            self.timestamp_ms,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}
