//! Trading-pair metadata.

use serde::{Deserialize, Serialize};

use super::enums::Exchange;

/// Maps an exchange-native symbol to the pair's base and quote identifiers.
///
/// Populated from the exchange's REST listing; read-only for streaming code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolPair {
    pub exchange: Exchange,
    /// Exchange-native identifier (e.g. `ETHBTC` on Binance, `ETH-BTC` on Bittrex).
    pub raw_symbol: String,
    pub base_id: String,
    pub quote_id: String,
}

impl SymbolPair {
    pub fn new(exchange: Exchange, raw_symbol: &str, base_id: &str, quote_id: &str) -> Self {
        Self {
            exchange,
            raw_symbol: raw_symbol.to_string(),
            base_id: base_id.to_uppercase(),
            quote_id: quote_id.to_uppercase(),
        }
    }

    /// Exchange-independent `(base, quote)` key, used to match pairs across exchanges.
    pub fn base_quote(&self) -> (&str, &str) {
        (&self.base_id, &self.quote_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_normalized_to_uppercase() {
        let pair = SymbolPair::new(Exchange::Bittrex, "eth-btc", "eth", "btc");
        assert_eq!(pair.raw_symbol, "eth-btc");
        assert_eq!(pair.base_quote(), ("ETH", "BTC"));
    }
}
