//! Binance spot kline streams.
//!
//! One plain-JSON websocket per batch of up to `max_sub_per_conn` symbols.
//! The whole batch is subscribed with a single `SUBSCRIBE` request; Binance
//! has no session authentication on market streams.

pub mod json_parser;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use cw_core::Exchange;
use cw_core::ws::{Transport, TransportEvent};
use tracing::debug;

use self::json_parser::{BinanceDecoder, build_kline_subscribe};
use crate::decoder::WireDecoder;
use crate::protocol::{Endpoint, LinkEvent, ProtocolLink, StreamProtocol};

pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";
pub const DEFAULT_REST_URL: &str = "https://api.binance.com";

pub struct BinanceProtocol {
    ws_url: String,
}

impl BinanceProtocol {
    pub fn new(ws_url: Option<&str>) -> Self {
        Self { ws_url: ws_url.unwrap_or(DEFAULT_WS_URL).to_string() }
    }
}

#[async_trait]
impl StreamProtocol for BinanceProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn endpoint(&self) -> Result<Endpoint> {
        Ok(Endpoint::new(&self.ws_url))
    }

    fn attach(&self, transport: Box<dyn Transport>, _endpoint: &Endpoint, batch: &[String]) -> Box<dyn ProtocolLink> {
        Box::new(BinanceLink { transport, batch: batch.to_vec(), next_id: 1 })
    }
}

struct BinanceLink {
    transport: Box<dyn Transport>,
    batch: Vec<String>,
    next_id: u64,
}

#[async_trait]
impl ProtocolLink for BinanceLink {
    async fn subscribe(&mut self) -> Result<()> {
        let id = self.next_id;
        self.next_id += 1;
        let msg = build_kline_subscribe(&self.batch, id);
        debug!("[binance] subscribing {} symbols (id {id})", self.batch.len());
        self.transport.send_text(msg).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        match self.transport.recv().await {
            TransportEvent::Frame(text) => LinkEvent::Frame(BinanceDecoder.decode(&text)),
            TransportEvent::Closed => LinkEvent::Closed,
            TransportEvent::Error(e) => LinkEvent::Error(e),
        }
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }
}
