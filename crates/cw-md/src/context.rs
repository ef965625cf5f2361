//! Process-wide service handles, built once in the runner and passed down.

use std::sync::Arc;

use cw_core::config::RateLimitConfig;
use cw_core::ratelimit::{LockTiming, RateLimiter, build_rate_limiter};
use cw_core::store::SharedStore;
use cw_core::ws::Connector;
use cw_core::Exchange;

#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn SharedStore>,
    pub http: reqwest::Client,
    pub connector: Arc<dyn Connector>,
    pub lock_timing: LockTiming,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn SharedStore>,
        http: reqwest::Client,
        connector: Arc<dyn Connector>,
        lock_timing: LockTiming,
    ) -> Self {
        Self { store, http, connector, lock_timing }
    }

    /// Limiter for `exchange`, sharing its budget with every other process
    /// pointed at the same store.
    pub fn rate_limiter(&self, exchange: Exchange, config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
        build_rate_limiter(self.store.clone(), exchange.as_str(), config, self.lock_timing)
    }
}
