//! Candle persistence in the shared store.
//!
//! Key layout:
//!
//! | Key | Type | Content |
//! |---|---|---|
//! | `ws:sub:{exchange}:{base}:{quote}` | hash | `timestamp_ms` → `ts;open;high;low;close;volume` |
//! | `ws:serve:{exchange}:{base}:{quote}` | hash | `time, open, high, low, close, volume` |
//! | `ws:sub:keys` | set | every history key ever written |
//!
//! The serving slot follows last-timestamp-wins: an update older than the
//! stored `time` is discarded, an equal or newer one replaces every field in
//! one atomic store call.

use std::sync::Arc;

use cw_core::store::{SharedStore, StoreResult};
use cw_core::{Candle, Exchange};

pub const SUB_KEYS_SET: &str = "ws:sub:keys";
pub const DELIMITER: char = ';';

pub fn history_key(exchange: Exchange, base_id: &str, quote_id: &str) -> String {
    format!("ws:sub:{exchange}:{base_id}:{quote_id}")
}

pub fn serving_key(exchange: Exchange, base_id: &str, quote_id: &str) -> String {
    format!("ws:serve:{exchange}:{base_id}:{quote_id}")
}

/// `ts;open;high;low;close;volume`
pub fn history_value(c: &Candle) -> String {
    let d = DELIMITER;
    format!("{}{d}{}{d}{}{d}{}{d}{}{d}{}", c.timestamp_ms, c.open, c.high, c.low, c.close, c.volume)
}

#[derive(Clone)]
pub struct CandleStore {
    store: Arc<dyn SharedStore>,
}

impl CandleStore {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Write `candle` to history and merge it into the serving slot.
    ///
    /// Returns `true` if the serving slot now holds this candle.
    pub async fn record(&self, candle: &Candle) -> StoreResult<bool> {
        let sub_key = history_key(candle.exchange, &candle.base_id, &candle.quote_id);
        self.store.set_add(SUB_KEYS_SET, &sub_key).await?;
        self.store
            .hash_set(&sub_key, &candle.timestamp_ms.to_string(), &history_value(candle))
            .await?;

        let serve_key = serving_key(candle.exchange, &candle.base_id, &candle.quote_id);
        let fields = [
            ("open", candle.open.to_string()),
            ("high", candle.high.to_string()),
            ("low", candle.low.to_string()),
            ("close", candle.close.to_string()),
            ("volume", candle.volume.to_string()),
        ];
        self.store
            .hash_replace_if_newer(&serve_key, "time", candle.timestamp_ms, &fields)
            .await
    }

    /// Read back the serving slot. `None` if nothing was recorded yet.
    pub async fn serving(&self, exchange: Exchange, base_id: &str, quote_id: &str) -> StoreResult<Option<Candle>> {
        let key = serving_key(exchange, base_id, quote_id);
        let slot = self.store.hash_get_all(&key).await?;
        if slot.is_empty() {
            return Ok(None);
        }

        let corrupt = || cw_core::error::StoreError::Corrupt { key: key.clone(), value: format!("{slot:?}") };
        let num = |field: &str| slot.get(field).and_then(|v| v.parse::<f64>().ok());
        Ok(Some(Candle {
            exchange,
            base_id: base_id.to_string(),
            quote_id: quote_id.to_string(),
            timestamp_ms: slot.get("time").and_then(|v| v.parse().ok()).ok_or_else(corrupt)?,
            open: num("open").ok_or_else(corrupt)?,
            high: num("high").ok_or_else(corrupt)?,
            low: num("low").ok_or_else(corrupt)?,
            close: num("close").ok_or_else(corrupt)?,
            volume: num("volume").ok_or_else(corrupt)?,
        }))
    }

    /// History entries for a pair, keyed by timestamp.
    pub async fn history(
        &self,
        exchange: Exchange,
        base_id: &str,
        quote_id: &str,
    ) -> StoreResult<std::collections::HashMap<String, String>> {
        self.store.hash_get_all(&history_key(exchange, base_id, quote_id)).await
    }
}

#[cfg(test)]
mod tests {
    use cw_core::store::MemoryStore;

    use super::*;

    fn candle(ts: u64, close: f64) -> Candle {
        Candle {
            exchange: Exchange::Binance,
            base_id: "ETH".into(),
            quote_id: "BTC".into(),
            timestamp_ms: ts,
            open: 0.065,
            high: 0.066,
            low: 0.064,
            close,
            volume: 3.5,
        }
    }

    #[test]
    fn keys_and_history_format() {
        assert_eq!(history_key(Exchange::Bittrex, "ETH", "BTC"), "ws:sub:bittrex:ETH:BTC");
        assert_eq!(serving_key(Exchange::Bittrex, "ETH", "BTC"), "ws:serve:bittrex:ETH:BTC");
        assert_eq!(history_value(&candle(1000, 0.0655)), "1000;0.065;0.066;0.064;0.0655;3.5");
    }

    #[tokio::test]
    async fn serving_slot_keeps_max_timestamp() {
        let candles = CandleStore::new(Arc::new(MemoryStore::new()));
        let order = [300u64, 100, 500, 200, 500, 400];
        let mut current_max = 0;
        for (i, ts) in order.iter().enumerate() {
            let written = candles.record(&candle(*ts, i as f64)).await.unwrap();
            assert_eq!(written, *ts >= current_max, "ts {ts}");
            current_max = current_max.max(*ts);
        }

        let slot = candles.serving(Exchange::Binance, "ETH", "BTC").await.unwrap().unwrap();
        assert_eq!(slot.timestamp_ms, 500);
        // The later delivery of the same timestamp wins.
        assert_eq!(slot.close, 4.0);

        let history = candles.history(Exchange::Binance, "ETH", "BTC").await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history["100"], "100;0.065;0.066;0.064;1;3.5");
    }

    #[tokio::test]
    async fn history_keys_are_registered() {
        let store = Arc::new(MemoryStore::new());
        let candles = CandleStore::new(store.clone());
        candles.record(&candle(1, 1.0)).await.unwrap();
        candles.record(&candle(2, 1.0)).await.unwrap();
        assert_eq!(store.set_members(SUB_KEYS_SET).await.unwrap(), vec!["ws:sub:binance:ETH:BTC"]);
        assert!(candles.serving(Exchange::Bittrex, "ETH", "BTC").await.unwrap().is_none());
    }
}
