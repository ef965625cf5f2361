//! Bittrex symbol metadata over REST (`GET /v3/markets`).

use anyhow::{Context, Result};
use cw_core::error::CwError;
use cw_core::{Exchange, SymbolPair};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Market {
    symbol: String,
    base_currency_symbol: String,
    quote_currency_symbol: String,
    status: String,
}

/// Keep only markets that are online.
pub fn parse_markets(body: &str) -> Result<Vec<SymbolPair>, CwError> {
    let markets: Vec<Market> = serde_json::from_str(body).map_err(|e| CwError::Parse(format!("markets: {e}")))?;
    Ok(markets
        .into_iter()
        .filter(|m| m.status == "ONLINE")
        .map(|m| SymbolPair::new(Exchange::Bittrex, &m.symbol, &m.base_currency_symbol, &m.quote_currency_symbol))
        .collect())
}

pub async fn fetch_symbols(http: &reqwest::Client, rest_url: &str) -> Result<Vec<SymbolPair>> {
    let url = format!("{}/markets", rest_url.trim_end_matches('/'));
    let body = http
        .get(&url)
        .send()
        .await
        .context("markets request failed")?
        .error_for_status()
        .context("markets HTTP error")?
        .text()
        .await?;
    Ok(parse_markets(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_online_markets_are_kept() {
        let body = r#"[
            {"symbol":"ETH-BTC","baseCurrencySymbol":"ETH","quoteCurrencySymbol":"BTC","status":"ONLINE","precision":8},
            {"symbol":"XYZ-BTC","baseCurrencySymbol":"XYZ","quoteCurrencySymbol":"BTC","status":"OFFLINE","precision":8}
        ]"#;
        let pairs = parse_markets(body).unwrap();
        assert_eq!(pairs, vec![SymbolPair::new(Exchange::Bittrex, "ETH-BTC", "ETH", "BTC")]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_markets("{}"), Err(CwError::Parse(_))));
    }
}
