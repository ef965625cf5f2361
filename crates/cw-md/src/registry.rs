//! Exchange registry: builds symbol lookups and sessions from config.

use std::sync::Arc;

use anyhow::{Result, bail};
use cw_core::config::ExchangeConfig;
use cw_core::ratelimit::RateLimiter;
use cw_core::{Exchange, SymbolPair};
use tracing::{info, warn};

use crate::binance::{self, BinanceProtocol};
use crate::bittrex::{self, BittrexProtocol, Credentials};
use crate::candle_store::CandleStore;
use crate::context::ServiceContext;
use crate::protocol::StreamProtocol;
use crate::session::{SessionSettings, StreamSession};
use crate::symbols::SymbolLookup;

async fn fetch_pairs(ctx: &ServiceContext, exchange: Exchange, cfg: &ExchangeConfig) -> Result<Vec<SymbolPair>> {
    match exchange {
        Exchange::Binance => {
            let url = cfg.rest_url.as_deref().unwrap_or(binance::DEFAULT_REST_URL);
            binance::rest::fetch_symbols(&ctx.http, url).await
        }
        Exchange::Bittrex => {
            let url = cfg.rest_url.as_deref().unwrap_or(bittrex::DEFAULT_REST_URL);
            bittrex::rest::fetch_symbols(&ctx.http, url).await
        }
    }
}

/// Fetch the exchange's symbol listing, falling back to the store cache.
///
/// The REST call draws from the same rate-limit budget as websocket connects.
pub async fn load_symbols(
    ctx: &ServiceContext,
    exchange: Exchange,
    cfg: &ExchangeConfig,
    limiter: &dyn RateLimiter,
) -> Result<SymbolLookup> {
    limiter.wait().await;
    match fetch_pairs(ctx, exchange, cfg).await {
        Ok(pairs) => {
            let lookup = SymbolLookup::new(exchange, pairs);
            info!("[registry] {exchange}: {} symbols listed", lookup.len());
            if let Err(e) = lookup.save(&ctx.store).await {
                warn!("[registry] {exchange}: failed to cache symbols: {e}");
            }
            Ok(lookup)
        }
        Err(e) => {
            warn!("[registry] {exchange}: symbol listing failed ({e:#}), using cached copy");
            let cached = SymbolLookup::load(&ctx.store, exchange).await?;
            if cached.is_empty() {
                bail!("no symbol metadata for {exchange}: {e:#}");
            }
            Ok(cached)
        }
    }
}

/// Create the streaming protocol for `exchange`.
pub fn create_protocol(ctx: &ServiceContext, exchange: Exchange, cfg: &ExchangeConfig) -> Arc<dyn StreamProtocol> {
    match exchange {
        Exchange::Binance => Arc::new(BinanceProtocol::new(cfg.ws_url.as_deref())),
        Exchange::Bittrex => {
            let credentials = cfg.credentials().map(|(key, secret)| Credentials {
                api_key: key.to_string(),
                api_secret: secret.to_string(),
            });
            Arc::new(BittrexProtocol::new(ctx.http.clone(), cfg.ws_url.as_deref(), credentials))
        }
    }
}

/// Create a session streaming every symbol in `lookup`.
pub fn create_session(
    ctx: &ServiceContext,
    cfg: &ExchangeConfig,
    limiter: Arc<dyn RateLimiter>,
    lookup: SymbolLookup,
) -> StreamSession {
    let exchange = lookup.exchange();
    StreamSession::new(
        create_protocol(ctx, exchange, cfg),
        ctx.connector.clone(),
        limiter,
        CandleStore::new(ctx.store.clone()),
        lookup,
        SessionSettings::from_config(cfg),
    )
}

#[cfg(test)]
mod tests {
    use cw_core::config::RateLimitConfig;
    use cw_core::ratelimit::LockTiming;
    use cw_core::store::{MemoryStore, SharedStore};

    use super::*;
    use crate::MdModule;
    use crate::test_support::ScriptedConnector;

    fn ctx(store: Arc<dyn SharedStore>) -> ServiceContext {
        ServiceContext::new(store, reqwest::Client::new(), Arc::new(ScriptedConnector::default()), LockTiming::default())
    }

    fn exchange_config(exchange: &str, rest_url: &str) -> ExchangeConfig {
        serde_json::from_value(serde_json::json!({ "exchange": exchange, "rest_url": rest_url })).unwrap()
    }

    #[tokio::test]
    async fn unreachable_rest_falls_back_to_cache() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        store.hash_set("symbols:bittrex", "ETH-BTC", "ETH;BTC").await.unwrap();
        let ctx = ctx(store);
        let cfg = exchange_config("bittrex", "http://127.0.0.1:1");
        let limiter = ctx.rate_limiter(Exchange::Bittrex, &RateLimitConfig::default());

        let lookup = load_symbols(&ctx, Exchange::Bittrex, &cfg, limiter.as_ref()).await.unwrap();
        assert_eq!(lookup.raw_symbols(), vec!["ETH-BTC"]);
    }

    #[tokio::test]
    async fn no_listing_and_no_cache_is_an_error() {
        let ctx = ctx(Arc::new(MemoryStore::new()));
        let cfg = exchange_config("binance", "http://127.0.0.1:1");
        let limiter = ctx.rate_limiter(Exchange::Binance, &RateLimitConfig::default());
        assert!(load_symbols(&ctx, Exchange::Binance, &cfg, limiter.as_ref()).await.is_err());
    }

    #[test]
    fn session_is_named_after_exchange() {
        let ctx = ctx(Arc::new(MemoryStore::new()));
        let cfg = exchange_config("bittrex", "http://127.0.0.1:1");
        let limiter = ctx.rate_limiter(Exchange::Bittrex, &RateLimitConfig::default());
        let session = create_session(&ctx, &cfg, limiter, SymbolLookup::new(Exchange::Bittrex, []));
        assert_eq!(session.name(), "bittrex_ws");
    }
}
