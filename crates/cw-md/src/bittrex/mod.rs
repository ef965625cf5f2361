//! Bittrex 1-minute candle streams over the SignalR `c3` hub.
//!
//! Each connection negotiates a token over REST, opens the websocket,
//! optionally authenticates, then subscribes `heartbeat` plus one
//! `candle_<SYMBOL>_MINUTE_1` channel per symbol in a single `Subscribe`
//! invocation. Candle pushes arrive compressed, see [`frame`].

pub mod auth;
pub mod frame;
pub mod hub;
pub mod rest;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cw_core::Exchange;
use cw_core::ws::{Transport, TransportEvent};
use tracing::{info, warn};

use self::auth::AuthChallenge;
use self::frame::BittrexDecoder;
use self::hub::HubConnection;
use crate::decoder::WireDecoder;
use crate::protocol::{AuthOutcome, Endpoint, LinkEvent, ProtocolLink, StreamProtocol};

pub const DEFAULT_HUB_URL: &str = "https://socket-v3.bittrex.com/signalr";
pub const DEFAULT_REST_URL: &str = "https://api.bittrex.com/v3";

/// API key and secret used for hub authentication.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("api_key", &self.api_key).finish_non_exhaustive()
    }
}

/// Channel names for one batch: the heartbeat plus a candle channel per symbol.
pub fn subscribe_channels(symbols: &[String]) -> Vec<String> {
    std::iter::once("heartbeat".to_string())
        .chain(symbols.iter().map(|s| format!("candle_{s}_MINUTE_1")))
        .collect()
}

pub struct BittrexProtocol {
    http: reqwest::Client,
    hub_url: String,
    credentials: Option<Credentials>,
}

impl BittrexProtocol {
    pub fn new(http: reqwest::Client, hub_url: Option<&str>, credentials: Option<Credentials>) -> Self {
        Self { http, hub_url: hub_url.unwrap_or(DEFAULT_HUB_URL).to_string(), credentials }
    }
}

#[async_trait]
impl StreamProtocol for BittrexProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Bittrex
    }

    async fn endpoint(&self) -> Result<Endpoint> {
        let token = hub::negotiate(&self.http, &self.hub_url).await?;
        Ok(Endpoint::new(hub::connect_url(&self.hub_url, &token)))
    }

    fn attach(&self, transport: Box<dyn Transport>, endpoint: &Endpoint, batch: &[String]) -> Box<dyn ProtocolLink> {
        Box::new(BittrexLink {
            hub: HubConnection::new(transport),
            http: self.http.clone(),
            connect_url: endpoint.url.clone(),
            hub_url: self.hub_url.clone(),
            credentials: self.credentials.clone(),
            channels: subscribe_channels(batch),
        })
    }
}

struct BittrexLink {
    hub: HubConnection,
    http: reqwest::Client,
    /// Websocket URL; the connection token for `start` is recovered from it.
    connect_url: String,
    hub_url: String,
    credentials: Option<Credentials>,
    channels: Vec<String>,
}

impl BittrexLink {
    fn connection_token(&self) -> Option<String> {
        let (_, query) = self.connect_url.split_once('?')?;
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix("connectionToken="))
            .and_then(|t| urlencoding::decode(t).ok())
            .map(|t| t.into_owned())
    }
}

#[async_trait]
impl ProtocolLink for BittrexLink {
    async fn ready(&mut self) -> Result<()> {
        let token = self.connection_token().context("connect url has no connection token")?;
        hub::start(&self.http, &self.hub_url, &token).await
    }

    fn has_auth(&self) -> bool {
        true
    }

    async fn authenticate(&mut self) -> Result<AuthOutcome> {
        let Some(creds) = self.credentials.clone() else {
            return Ok(AuthOutcome::Skipped);
        };
        let challenge = AuthChallenge::sign(&creds.api_secret)?;
        match self.hub.invoke("Authenticate", challenge.invoke_args(&creds.api_key)).await {
            Ok(response) => Ok(auth_outcome(&response)),
            Err(e) if e.is_transport() => Err(e.into()),
            Err(e) => Ok(AuthOutcome::Rejected(e.to_string())),
        }
    }

    async fn subscribe(&mut self) -> Result<()> {
        let response = self.hub.invoke("Subscribe", vec![serde_json::json!(self.channels)]).await?;
        let Some(results) = response.as_array() else {
            warn!("[bittrex] unexpected Subscribe response: {response}");
            return Ok(());
        };
        for (channel, result) in self.channels.iter().zip(results) {
            if result.get("Success").and_then(|s| s.as_bool()).unwrap_or(false) {
                info!("[bittrex] subscribed to {channel}");
            } else {
                warn!("[bittrex] subscription to {channel} failed: {}", error_code(result));
            }
        }
        let missing = unanswered(&self.channels, results.len());
        if !missing.is_empty() {
            warn!("[bittrex] no Subscribe result for {} channel(s): {}", missing.len(), missing.join(", "));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        match self.hub.next_frame().await {
            TransportEvent::Frame(text) => LinkEvent::Frame(BittrexDecoder.decode(&text)),
            TransportEvent::Closed => LinkEvent::Closed,
            TransportEvent::Error(e) => LinkEvent::Error(e),
        }
    }

    async fn close(&mut self) {
        self.hub.close().await;
    }
}

/// Channels past the end of a Subscribe response array.
fn unanswered(channels: &[String], answered: usize) -> &[String] {
    channels.get(answered..).unwrap_or_default()
}

fn error_code(result: &serde_json::Value) -> String {
    result
        .get("ErrorCode")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn auth_outcome(response: &serde_json::Value) -> AuthOutcome {
    if response.get("Success").and_then(|s| s.as_bool()).unwrap_or(false) {
        AuthOutcome::Authenticated
    } else {
        AuthOutcome::Rejected(error_code(response))
    }
}
