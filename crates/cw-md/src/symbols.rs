//! Symbol metadata: raw exchange symbol → `(base_id, quote_id)`.
//!
//! Loaded once per session from the exchange REST listing. A copy is cached in
//! the shared store under `symbols:{exchange}` so a process can still start
//! when the REST endpoint is unreachable.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use cw_core::store::{SharedStore, StoreResult};
use cw_core::{Candle, Exchange, RawCandle, SymbolPair};
use tracing::warn;

pub fn cache_key(exchange: Exchange) -> String {
    format!("symbols:{exchange}")
}

#[derive(Debug, Clone)]
pub struct SymbolLookup {
    exchange: Exchange,
    by_raw: AHashMap<String, SymbolPair>,
}

impl SymbolLookup {
    pub fn new(exchange: Exchange, pairs: impl IntoIterator<Item = SymbolPair>) -> Self {
        let by_raw = pairs
            .into_iter()
            .filter(|p| p.exchange == exchange)
            .map(|p| (p.raw_symbol.clone(), p))
            .collect();
        Self { exchange, by_raw }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn len(&self) -> usize {
        self.by_raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_raw.is_empty()
    }

    pub fn get(&self, raw_symbol: &str) -> Option<&SymbolPair> {
        self.by_raw.get(raw_symbol)
    }

    /// Raw symbols in a stable (sorted) order, used for batch planning.
    pub fn raw_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.by_raw.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn base_quotes(&self) -> AHashSet<(String, String)> {
        self.by_raw
            .values()
            .map(|p| (p.base_id.clone(), p.quote_id.clone()))
            .collect()
    }

    /// Keep only pairs whose `(base, quote)` is in `keep`.
    pub fn retain_base_quotes(&mut self, keep: &AHashSet<(String, String)>) {
        self.by_raw
            .retain(|_, p| keep.contains(&(p.base_id.clone(), p.quote_id.clone())));
    }

    /// Keep only the listed raw symbols (case-insensitive).
    pub fn retain_symbols(&mut self, symbols: &[String]) {
        let wanted: AHashSet<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        self.by_raw.retain(|raw, _| wanted.contains(&raw.to_uppercase()));
    }

    /// Attach base/quote identifiers to a decoded candle.
    pub fn resolve(&self, raw: &RawCandle) -> Option<Candle> {
        self.get(&raw.raw_symbol)
            .map(|p| Candle::from_raw(self.exchange, &p.base_id, &p.quote_id, raw))
    }

    /// Cache into `symbols:{exchange}` as `raw_symbol → base;quote`.
    pub async fn save(&self, store: &Arc<dyn SharedStore>) -> StoreResult<()> {
        let key = cache_key(self.exchange);
        for pair in self.by_raw.values() {
            store
                .hash_set(&key, &pair.raw_symbol, &format!("{};{}", pair.base_id, pair.quote_id))
                .await?;
        }
        Ok(())
    }

    /// Load a cached lookup. Malformed entries are skipped.
    pub async fn load(store: &Arc<dyn SharedStore>, exchange: Exchange) -> StoreResult<Self> {
        let key = cache_key(exchange);
        let cached = store.hash_get_all(&key).await?;
        let pairs = cached.iter().filter_map(|(raw, value)| match value.split_once(';') {
            Some((base, quote)) => Some(SymbolPair::new(exchange, raw, base, quote)),
            None => {
                warn!("[symbols] '{key}' has malformed entry {raw}={value}");
                None
            }
        });
        Ok(Self::new(exchange, pairs))
    }
}

/// `(base, quote)` pairs listed on every exchange in `lookups`.
pub fn mutual_base_quotes(lookups: &[SymbolLookup]) -> AHashSet<(String, String)> {
    let mut iter = lookups.iter();
    let Some(first) = iter.next() else {
        return AHashSet::new();
    };
    let mut common = first.base_quotes();
    for lookup in iter {
        let other = lookup.base_quotes();
        common.retain(|bq| other.contains(bq));
    }
    common
}
