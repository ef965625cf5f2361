//! End-to-end: scripted Binance frames through a session into the store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cw_core::config::RateLimitConfig;
use cw_core::error::CwError;
use cw_core::ratelimit::{LockTiming, build_rate_limiter};
use cw_core::store::{MemoryStore, SharedStore};
use cw_core::ws::{Connector, Transport, TransportEvent};
use cw_core::{Exchange, SymbolPair};
use cw_md::MdModule;
use cw_md::binance::BinanceProtocol;
use cw_md::candle_store::{CandleStore, SUB_KEYS_SET};
use cw_md::session::{SessionSettings, StreamSession};
use cw_md::symbols::SymbolLookup;

struct Replay {
    frames: VecDeque<TransportEvent>,
}

#[async_trait]
impl Transport for Replay {
    async fn send_text(&mut self, _text: String) -> Result<(), CwError> {
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.frames.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

struct OneShot {
    frames: Mutex<Option<Vec<TransportEvent>>>,
}

#[async_trait]
impl Connector for OneShot {
    async fn connect(&self, _url: &str, _headers: &[(String, String)]) -> Result<Box<dyn Transport>, CwError> {
        let frames = self.frames.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(Replay { frames: frames.into() }))
    }
}

fn kline(ts: u64, close: &str) -> TransportEvent {
    TransportEvent::Frame(format!(
        r#"{{"e":"kline","E":1,"s":"ETHBTC","k":{{"t":{ts},"o":"0.065","h":"0.066","l":"0.064","c":"{close}","v":"12"}}}}"#
    ))
}

#[tokio::test(start_paused = true)]
async fn out_of_order_deltas_keep_latest_candle() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let connector = Arc::new(OneShot {
        frames: Mutex::new(Some(vec![
            TransportEvent::Frame(r#"{"result":null,"id":1}"#.into()),
            kline(1000, "0.0655"),
            TransportEvent::Frame("garbage".into()),
            kline(900, "0.0600"),
        ])),
    });

    let limiter = build_rate_limiter(store.clone(), "binance", &RateLimitConfig::default(), LockTiming::default());
    let lookup = SymbolLookup::new(Exchange::Binance, [SymbolPair::new(Exchange::Binance, "ETHBTC", "ETH", "BTC")]);
    let settings = SessionSettings {
        max_sub_per_conn: 200,
        staleness: Duration::from_secs(60),
        check_interval: Duration::from_secs(1),
        jitter: (Duration::from_millis(5), Duration::from_millis(5)),
    };
    let mut session = StreamSession::new(
        Arc::new(BinanceProtocol::new(None)),
        connector,
        limiter,
        CandleStore::new(store.clone()),
        lookup,
        settings,
    );

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.stop().await.unwrap();

    let candles = CandleStore::new(store.clone());
    let slot = candles.serving(Exchange::Binance, "ETH", "BTC").await.unwrap().unwrap();
    assert_eq!(slot.timestamp_ms, 1000);
    assert_eq!(slot.close, 0.0655);

    let history = candles.history(Exchange::Binance, "ETH", "BTC").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history["1000"], "1000;0.065;0.066;0.064;0.0655;12");
    assert_eq!(history["900"], "900;0.065;0.066;0.064;0.06;12");

    assert_eq!(store.set_members(SUB_KEYS_SET).await.unwrap(), vec!["ws:sub:binance:ETH:BTC"]);
}
