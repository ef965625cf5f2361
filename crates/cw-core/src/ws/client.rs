//! Single WebSocket connection over `tokio-tungstenite`.
//!
//! Unlike a self-reconnecting client, a [`WsTransport`] is a plain connection:
//! reconnect policy, jitter and rate limiting belong to the session that owns
//! it. Ping frames are answered here so callers only see application data.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Connector, Transport, TransportEvent};
use crate::error::CwError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    stream: WsStream,
    url: String,
}

impl WsTransport {
    /// Perform the TLS + WebSocket handshake with optional extra headers.
    pub async fn connect(url: &str, headers: &[(String, String)]) -> Result<Self, CwError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| CwError::WebSocket(format!("bad url {url}: {e}")))?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CwError::WebSocket(format!("bad header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CwError::WebSocket(format!("bad header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CwError::WebSocket(format!("connect {url}: {e}")))?;
        debug!("[ws] connected to {url}");
        Ok(Self { stream, url: url.to_string() })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), CwError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| CwError::WebSocket(format!("send to {}: {e}", self.url)))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text.to_string()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return TransportEvent::Frame(text),
                    Err(_) => warn!("[ws] {} dropped non-UTF-8 binary frame ({} bytes)", self.url, data.len()),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return TransportEvent::Error(e.to_string());
                    }
                }
                Some(Ok(Message::Close(_))) | None => return TransportEvent::Closed,
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                _ => {} // Pong, raw Frame
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Production [`Connector`] backed by [`WsTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, headers: &[(String, String)]) -> Result<Box<dyn Transport>, CwError> {
        Ok(Box::new(WsTransport::connect(url, headers).await?))
    }
}
