//! Scripted transports for driving protocols and sessions in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cw_core::error::CwError;
use cw_core::ws::{Connector, Transport, TransportEvent};

pub type Sent = Arc<Mutex<Vec<String>>>;

/// Replays a fixed list of inbound events, then stays silent forever.
pub struct ScriptedTransport {
    inbound: VecDeque<TransportEvent>,
    sent: Sent,
}

impl ScriptedTransport {
    pub fn new(inbound: Vec<TransportEvent>) -> (Self, Sent) {
        let sent = Sent::default();
        (Self { inbound: inbound.into(), sent: sent.clone() }, sent)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&mut self, text: String) -> Result<(), CwError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        match self.inbound.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// Hands out one script per connect; connections beyond the scripts are silent.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    pub connects: AtomicUsize,
    pub sent: Sent,
}

impl ScriptedConnector {
    pub fn new(scripts: Vec<Vec<TransportEvent>>) -> Self {
        Self { scripts: Mutex::new(scripts.into()), ..Default::default() }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str, _headers: &[(String, String)]) -> Result<Box<dyn Transport>, CwError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let inbound: VecDeque<TransportEvent> = script.into();
        Ok(Box::new(ScriptedTransport { inbound, sent: self.sent.clone() }))
    }
}
