//! Streaming session: one supervised websocket per symbol batch.
//!
//! A [`StreamSession`] plans its symbols into batches and spawns one
//! connection worker per batch. Each worker cycles through
//!
//! ```text
//! Disconnected ─► Connecting ─► Authenticating? ─► Subscribing ─► Streaming
//!      ▲                                                             │
//!      └───────────── closed / error / stale ◄──────────────────────┘
//! ```
//!
//! Every connect attempt is preceded by a random jitter delay and gated by the
//! exchange's rate limiter. While streaming, a periodic check recycles the
//! connection when no frame has arrived for longer than the staleness
//! threshold. Workers only exit on shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use cw_core::config::ExchangeConfig;
use cw_core::ratelimit::RateLimiter;
use cw_core::ws::Connector;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::MdModule;
use crate::candle_store::CandleStore;
use crate::decoder::WireEvent;
use crate::planner::plan_batches;
use crate::protocol::{AuthOutcome, LinkEvent, ProtocolLink, StreamProtocol};
use crate::symbols::SymbolLookup;

// ---------------------------------------------------------------------------
// Settings & liveness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_sub_per_conn: usize,
    pub staleness: Duration,
    pub check_interval: Duration,
    /// Inclusive reconnect delay range.
    pub jitter: (Duration, Duration),
}

impl SessionSettings {
    pub fn from_config(cfg: &ExchangeConfig) -> Self {
        Self {
            max_sub_per_conn: cfg.max_sub_per_conn(),
            staleness: cfg.staleness(),
            check_interval: cfg.check_interval(),
            jitter: cfg.jitter(),
        }
    }

    fn jitter_delay(&self) -> Duration {
        let (lo, hi) = self.jitter;
        let (lo, hi) = (lo.as_millis() as u64, hi.as_millis() as u64);
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Time since the last inbound frame on a connection.
#[derive(Debug)]
pub struct Liveness {
    last_activity: Instant,
    staleness: Duration,
}

impl Liveness {
    pub fn new(staleness: Duration) -> Self {
        Self { last_activity: Instant::now(), staleness }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn is_stale(&self) -> bool {
        self.idle() > self.staleness
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    Streaming,
}

// ---------------------------------------------------------------------------
// Shutdown helpers
// ---------------------------------------------------------------------------

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Run `fut` unless shutdown arrives first.
async fn until_shutdown<F: Future>(rx: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    tokio::select! {
        out = fut => Some(out),
        _ = shutdown_signalled(rx) => None,
    }
}

// ---------------------------------------------------------------------------
// ConnectionWorker — the per-batch state machine
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Closed,
    Stale,
}

/// Run one handshake step, giving up on shutdown or once `deadline` passes.
async fn bounded<F: Future>(rx: &mut watch::Receiver<bool>, deadline: Instant, fut: F) -> Result<F::Output, Exit> {
    match until_shutdown(rx, tokio::time::timeout_at(deadline, fut)).await {
        None => Err(Exit::Shutdown),
        Some(Err(_)) => Err(Exit::Stale),
        Some(Ok(out)) => Ok(out),
    }
}

struct ConnectionWorker {
    label: String,
    batch: Vec<String>,
    protocol: Arc<dyn StreamProtocol>,
    connector: Arc<dyn Connector>,
    limiter: Arc<dyn RateLimiter>,
    candles: CandleStore,
    lookup: Arc<SymbolLookup>,
    settings: SessionSettings,
    shutdown: watch::Receiver<bool>,
    state: ConnectionState,
}

impl ConnectionWorker {
    fn set_state(&mut self, state: ConnectionState) {
        debug!("[{}] {:?} -> {:?}", self.label, self.state, state);
        self.state = state;
    }

    async fn run(mut self) {
        info!("[{}] worker started with {} symbols", self.label, self.batch.len());
        loop {
            self.set_state(ConnectionState::Disconnected);
            let delay = self.settings.jitter_delay();
            if until_shutdown(&mut self.shutdown, tokio::time::sleep(delay)).await.is_none() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            if until_shutdown(&mut self.shutdown, self.limiter.wait()).await.is_none() {
                break;
            }

            match self.cycle().await {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Closed) => info!("[{}] connection closed, reconnecting", self.label),
                Ok(Exit::Stale) => warn!(
                    "[{}] no progress for over {:?}, reconnecting",
                    self.label, self.settings.staleness
                ),
                Err(e) => warn!("[{}] {e:#}, reconnecting", self.label),
            }
        }
        info!("[{}] worker stopped", self.label);
    }

    /// One connection lifetime: open, handshake, stream.
    ///
    /// Everything up to Streaming shares one deadline of `staleness`; a
    /// handshake that has not finished by then counts as a stale connection.
    async fn cycle(&mut self) -> Result<Exit> {
        let deadline = Instant::now() + self.settings.staleness;
        let (protocol, connector, batch, label) = (&self.protocol, &self.connector, &self.batch, &self.label);
        let open = async {
            let endpoint = protocol.endpoint().await?;
            let transport = connector.connect(&endpoint.url, &endpoint.headers).await?;
            debug!("[{label}] connected to {}", endpoint.url);
            anyhow::Ok(protocol.attach(transport, &endpoint, batch))
        };
        let mut link = match bounded(&mut self.shutdown, deadline, open).await {
            Ok(link) => link?,
            Err(exit) => return Ok(exit),
        };

        let exit = self.drive(link.as_mut(), deadline).await;
        link.close().await;
        exit
    }

    async fn drive(&mut self, link: &mut dyn ProtocolLink, deadline: Instant) -> Result<Exit> {
        match bounded(&mut self.shutdown, deadline, link.ready()).await {
            Ok(ready) => ready?,
            Err(exit) => return Ok(exit),
        }

        if link.has_auth() {
            self.set_state(ConnectionState::Authenticating);
            match bounded(&mut self.shutdown, deadline, link.authenticate()).await {
                Ok(outcome) => self.log_auth(outcome?),
                Err(exit) => return Ok(exit),
            }
        }

        self.set_state(ConnectionState::Subscribing);
        match bounded(&mut self.shutdown, deadline, link.subscribe()).await {
            Ok(subscribed) => subscribed?,
            Err(exit) => return Ok(exit),
        }

        self.set_state(ConnectionState::Streaming);
        let mut liveness = Liveness::new(self.settings.staleness);
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let event = tokio::select! {
                _ = shutdown_signalled(&mut self.shutdown) => return Ok(Exit::Shutdown),
                _ = ticker.tick() => None,
                event = link.next_event() => Some(event),
            };
            let Some(event) = event else {
                if liveness.is_stale() {
                    return Ok(Exit::Stale);
                }
                continue;
            };

            match event {
                LinkEvent::Frame(Ok(events)) => {
                    liveness.touch();
                    for event in events {
                        self.handle(link, event).await?;
                    }
                }
                LinkEvent::Frame(Err(e)) => {
                    liveness.touch();
                    warn!("[{}] dropped undecodable frame: {e}", self.label);
                }
                LinkEvent::Closed => return Ok(Exit::Closed),
                LinkEvent::Error(e) => bail!("transport error: {e}"),
            }
        }
    }

    async fn handle(&self, link: &mut dyn ProtocolLink, event: WireEvent) -> Result<()> {
        match event {
            WireEvent::Candle(raw) => match self.lookup.resolve(&raw) {
                Some(candle) => {
                    if let Err(e) = self.candles.record(&candle).await {
                        warn!("[{}] failed to record {candle}: {e}", self.label);
                    }
                }
                None => debug!("[{}] candle for unknown symbol {}", self.label, raw.raw_symbol),
            },
            WireEvent::SubscribeAck { id } => info!("[{}] subscription acknowledged (id {id:?})", self.label),
            WireEvent::Heartbeat => trace!("[{}] heartbeat", self.label),
            WireEvent::AuthExpiring => {
                info!("[{}] authentication expiring, re-authenticating", self.label);
                self.log_auth(link.authenticate().await?);
            }
            WireEvent::InvocationResult { id, .. } => debug!("[{}] unsolicited invocation result I={id}", self.label),
            WireEvent::Ignored => {}
        }
        Ok(())
    }

    fn log_auth(&self, outcome: AuthOutcome) {
        match outcome {
            AuthOutcome::Authenticated => info!("[{}] authenticated", self.label),
            AuthOutcome::Skipped => info!("[{}] authentication skipped: no API secret configured", self.label),
            AuthOutcome::Rejected(code) => {
                warn!("[{}] authentication failed ({code}), continuing unauthenticated", self.label)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StreamSession — MdModule for one exchange
// ---------------------------------------------------------------------------

pub struct StreamSession {
    name: String,
    protocol: Arc<dyn StreamProtocol>,
    connector: Arc<dyn Connector>,
    limiter: Arc<dyn RateLimiter>,
    candles: CandleStore,
    lookup: Arc<SymbolLookup>,
    settings: SessionSettings,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamSession {
    pub fn new(
        protocol: Arc<dyn StreamProtocol>,
        connector: Arc<dyn Connector>,
        limiter: Arc<dyn RateLimiter>,
        candles: CandleStore,
        lookup: SymbolLookup,
        settings: SessionSettings,
    ) -> Self {
        Self {
            name: format!("{}_ws", protocol.exchange()),
            protocol,
            connector,
            limiter,
            candles,
            lookup: Arc::new(lookup),
            settings,
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Symbol batches, one per connection.
    pub fn batches(&self) -> Vec<Vec<String>> {
        plan_batches(&self.lookup.raw_symbols(), self.settings.max_sub_per_conn)
    }
}

#[async_trait]
impl MdModule for StreamSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            warn!("[{}] already started", self.name);
            return Ok(());
        }

        let batches = self.batches();
        if batches.is_empty() {
            warn!("[{}] no symbols to subscribe", self.name);
        }
        info!("[{}] {} symbols over {} connections", self.name, self.lookup.len(), batches.len());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        for (i, batch) in batches.into_iter().enumerate() {
            let worker = ConnectionWorker {
                label: format!("{}-{i}", self.name),
                batch,
                protocol: self.protocol.clone(),
                connector: self.connector.clone(),
                limiter: self.limiter.clone(),
                candles: self.candles.clone(),
                lookup: self.lookup.clone(),
                settings: self.settings,
                shutdown: shutdown_rx.clone(),
                state: ConnectionState::Disconnected,
            };
            self.tasks.push(tokio::spawn(worker.run()));
        }
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("[{}] worker task failed: {e}", self.name);
            }
        }
        info!("[{}] stopped", self.name);
        Ok(())
    }
}
