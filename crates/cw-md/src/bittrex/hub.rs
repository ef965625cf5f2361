//! Classic SignalR hub plumbing for the Bittrex `c3` hub.
//!
//! Connection setup is three steps: a REST `negotiate` returning a connection
//! token, the websocket `connect`, then a REST `start`. Afterwards the client
//! calls server methods with `{"H": hub, "M": method, "A": args, "I": id}` and
//! the server answers with a frame carrying the same `I`.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use cw_core::ws::{Transport, TransportEvent};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::decoder::{WireDecoder, WireEvent};

use super::frame::BittrexDecoder;

pub const HUB_NAME: &str = "c3";
pub const CLIENT_PROTOCOL: &str = "1.5";
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

fn connection_data() -> String {
    serde_json::json!([{ "name": HUB_NAME }]).to_string()
}

fn query(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn base(hub_url: &str) -> &str {
    hub_url.trim_end_matches('/')
}

pub fn negotiate_url(hub_url: &str) -> String {
    let data = connection_data();
    format!(
        "{}/negotiate?{}",
        base(hub_url),
        query(&[("clientProtocol", CLIENT_PROTOCOL), ("connectionData", &data)])
    )
}

fn transport_query(token: &str) -> String {
    let data = connection_data();
    query(&[
        ("transport", "webSockets"),
        ("clientProtocol", CLIENT_PROTOCOL),
        ("connectionToken", token),
        ("connectionData", &data),
    ])
}

/// Websocket URL for `hub_url` (`https` becomes `wss`, `http` becomes `ws`).
pub fn connect_url(hub_url: &str, token: &str) -> String {
    let hub = base(hub_url);
    let ws = if let Some(rest) = hub.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = hub.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        hub.to_string()
    };
    format!("{ws}/connect?{}", transport_query(token))
}

pub fn start_url(hub_url: &str, token: &str) -> String {
    format!("{}/start?{}", base(hub_url), transport_query(token))
}

// ---------------------------------------------------------------------------
// REST steps
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Negotiation {
    #[serde(rename = "ConnectionToken")]
    connection_token: String,
}

/// Negotiate a connection token.
pub async fn negotiate(http: &reqwest::Client, hub_url: &str) -> Result<String> {
    let resp: Negotiation = http
        .get(negotiate_url(hub_url))
        .send()
        .await
        .context("negotiate request failed")?
        .error_for_status()
        .context("negotiate HTTP error")?
        .json()
        .await?;
    Ok(resp.connection_token)
}

/// Tell the server the websocket transport is up.
pub async fn start(http: &reqwest::Client, hub_url: &str, token: &str) -> Result<()> {
    http.get(start_url(hub_url, token))
        .send()
        .await
        .context("start request failed")?
        .error_for_status()
        .context("start HTTP error")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// HubConnection — invoke/response correlation over one transport
// ---------------------------------------------------------------------------

/// Why a hub invocation produced no result.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The connection closed or failed; it is unusable afterwards.
    #[error("{method}: {reason}")]
    Transport { method: String, reason: String },

    /// The server answered with an error frame (`E`).
    #[error("{method}: {message}")]
    Failed { method: String, message: String },

    #[error("{method}: no response within {timeout:?}")]
    Timeout { method: String, timeout: Duration },
}

impl InvokeError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Owns the transport of one hub connection.
///
/// Invocations are sequential: while waiting for a response, unrelated frames
/// are queued and handed out by [`next_frame`](Self::next_frame) in arrival
/// order before any new frame is read.
pub struct HubConnection {
    transport: Box<dyn Transport>,
    next_id: u64,
    backlog: VecDeque<String>,
    timeout: Duration,
}

impl HubConnection {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport, next_id: 1, backlog: VecDeque::new(), timeout: INVOKE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call a hub method and wait for its result.
    pub async fn invoke(&mut self, method: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value, InvokeError> {
        let id = self.next_id;
        self.next_id += 1;

        let msg = serde_json::json!({ "H": HUB_NAME, "M": method, "A": args, "I": id }).to_string();
        debug!("[bittrex] invoke {method} (I={id})");
        if let Err(e) = self.transport.send_text(msg).await {
            return Err(InvokeError::Transport { method: method.to_string(), reason: e.to_string() });
        }

        match tokio::time::timeout(self.timeout, self.await_result(method, id)).await {
            Ok(result) => result,
            Err(_) => Err(InvokeError::Timeout { method: method.to_string(), timeout: self.timeout }),
        }
    }

    async fn await_result(&mut self, method: &str, id: u64) -> Result<serde_json::Value, InvokeError> {
        loop {
            let reason = match self.transport.recv().await {
                TransportEvent::Frame(text) => {
                    if let Some(result) = Self::match_result(&text, id) {
                        return result.map_err(|message| InvokeError::Failed { method: method.to_string(), message });
                    }
                    self.backlog.push_back(text);
                    continue;
                }
                TransportEvent::Closed => "connection closed while awaiting response".to_string(),
                TransportEvent::Error(e) => format!("transport error while awaiting response: {e}"),
            };
            return Err(InvokeError::Transport { method: method.to_string(), reason });
        }
    }

    fn match_result(text: &str, id: u64) -> Option<Result<serde_json::Value, String>> {
        let events = BittrexDecoder.decode(text).ok()?;
        events.into_iter().find_map(|event| match event {
            WireEvent::InvocationResult { id: got, result } if got == id => Some(result),
            _ => None,
        })
    }

    /// Next inbound frame, draining frames queued during invocations first.
    pub async fn next_frame(&mut self) -> TransportEvent {
        match self.backlog.pop_front() {
            Some(text) => TransportEvent::Frame(text),
            None => self.transport.recv().await,
        }
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;

    #[test]
    fn urls_carry_hub_and_token() {
        let hub = "https://socket-v3.bittrex.com/signalr";
        assert_eq!(
            negotiate_url(hub),
            "https://socket-v3.bittrex.com/signalr/negotiate?clientProtocol=1.5\
             &connectionData=%5B%7B%22name%22%3A%22c3%22%7D%5D"
        );
        let connect = connect_url(hub, "a+b/c");
        assert!(connect.starts_with("wss://socket-v3.bittrex.com/signalr/connect?transport=webSockets"));
        assert!(connect.contains("connectionToken=a%2Bb%2Fc"));
        assert!(start_url(hub, "t").starts_with("https://socket-v3.bittrex.com/signalr/start?"));
    }

    #[tokio::test]
    async fn unrelated_frames_are_queued_during_invoke() {
        let (transport, sent) = ScriptedTransport::new(vec![
            TransportEvent::Frame(r#"{"C":"d-1","M":[{"H":"C3","M":"heartbeat","A":[]}]}"#.into()),
            TransportEvent::Frame(r#"{"R":"stale","I":"99"}"#.into()),
            TransportEvent::Frame(r#"{"R":{"Success":true},"I":"1"}"#.into()),
        ]);
        let mut hub = HubConnection::new(Box::new(transport));

        let result = hub.invoke("Authenticate", vec!["k".into()]).await.unwrap();
        assert_eq!(result["Success"], true);

        let request: serde_json::Value = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert_eq!(request["H"], "c3");
        assert_eq!(request["M"], "Authenticate");
        assert_eq!(request["I"], 1);

        // Backlog is replayed in arrival order.
        assert!(matches!(hub.next_frame().await, TransportEvent::Frame(f) if f.contains("heartbeat")));
        assert!(matches!(hub.next_frame().await, TransportEvent::Frame(f) if f.contains("stale")));
    }

    #[tokio::test]
    async fn invocation_error_and_close() {
        let (transport, _) = ScriptedTransport::new(vec![
            TransportEvent::Frame(r#"{"I":"1","E":"boom"}"#.into()),
            TransportEvent::Closed,
        ]);
        let mut hub = HubConnection::new(Box::new(transport));
        let err = hub.invoke("Subscribe", vec![]).await.unwrap_err();
        assert!(matches!(err, InvokeError::Failed { ref message, .. } if message == "boom"));
        assert!(!err.is_transport());
        assert!(hub.invoke("Subscribe", vec![]).await.unwrap_err().is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (transport, _) = ScriptedTransport::new(vec![]);
        let mut hub = HubConnection::new(Box::new(transport)).with_timeout(Duration::from_secs(2));
        let err = hub.invoke("Subscribe", vec![]).await.unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { .. }));
        assert!(err.to_string().contains("no response"));
    }
}
