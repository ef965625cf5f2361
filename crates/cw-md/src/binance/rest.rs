//! Binance symbol metadata over REST (`GET /api/v3/exchangeInfo`).

use anyhow::{Context, Result};
use cw_core::error::CwError;
use cw_core::{Exchange, SymbolPair};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
}

/// Keep only pairs currently open for trading.
pub fn parse_exchange_info(body: &str) -> Result<Vec<SymbolPair>, CwError> {
    let info: ExchangeInfo =
        serde_json::from_str(body).map_err(|e| CwError::Parse(format!("exchangeInfo: {e}")))?;
    Ok(info
        .symbols
        .into_iter()
        .filter(|s| s.status == "TRADING")
        .map(|s| SymbolPair::new(Exchange::Binance, &s.symbol, &s.base_asset, &s.quote_asset))
        .collect())
}

pub async fn fetch_symbols(http: &reqwest::Client, rest_url: &str) -> Result<Vec<SymbolPair>> {
    let url = format!("{}/api/v3/exchangeInfo", rest_url.trim_end_matches('/'));
    let body = http
        .get(&url)
        .send()
        .await
        .context("exchangeInfo request failed")?
        .error_for_status()
        .context("exchangeInfo HTTP error")?
        .text()
        .await?;
    Ok(parse_exchange_info(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_trading_symbols_are_kept() {
        let body = r#"{"timezone":"UTC","symbols":[
            {"symbol":"ETHBTC","status":"TRADING","baseAsset":"ETH","quoteAsset":"BTC"},
            {"symbol":"LUNABTC","status":"BREAK","baseAsset":"LUNA","quoteAsset":"BTC"}
        ]}"#;
        let pairs = parse_exchange_info(body).unwrap();
        assert_eq!(pairs, vec![SymbolPair::new(Exchange::Binance, "ETHBTC", "ETH", "BTC")]);
    }
}
