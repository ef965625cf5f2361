//! GCRA (generic cell rate algorithm) limiter.
//!
//! The only persisted state is the theoretical arrival time (TAT) in
//! microseconds. A request at store time `t` is admitted when
//! `t >= max(TAT, t) + increment - period`, after which the TAT advances by
//! `increment = period / rate_limit`. This paces requests to the average rate
//! while allowing a burst of up to `rate_limit` requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Decision, LockTiming, RateLimiter, limiter_lock, state_key};
use crate::clock::ClockSource;
use crate::config::RateLimitAlgorithm;
use crate::lock::DistributedLock;
use crate::store::{SharedStore, StoreResult};

pub struct GcraRateLimiter {
    store: Arc<dyn SharedStore>,
    clock: ClockSource,
    lock: DistributedLock,
    key: String,
    period_us: u64,
    increment_us: u64,
}

impl GcraRateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        exchange: &str,
        rate_limit: u32,
        period: Duration,
        timing: LockTiming,
    ) -> Self {
        let key = state_key(exchange, RateLimitAlgorithm::Gcra);
        let period_us = period.as_micros() as u64;
        Self {
            clock: ClockSource::new(store.clone()),
            lock: limiter_lock(&store, &key, timing),
            store,
            key,
            period_us,
            increment_us: period_us / u64::from(rate_limit.max(1)),
        }
    }

    /// Minimum spacing between requests at the steady rate.
    pub fn increment(&self) -> Duration {
        Duration::from_micros(self.increment_us)
    }

    fn fallback(&self) -> Decision {
        Decision::Deny { retry_after: self.increment() }
    }

    async fn decide_locked(&self) -> StoreResult<Decision> {
        let t = self.clock.now_us().await?;

        // First caller initializes; later initializers are no-ops.
        self.store.set_nx(&self.key, &t.to_string()).await?;
        let stored = match self.store.get(&self.key).await? {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warn!("[gcra] '{}' holds unparsable TAT '{raw}', resetting", self.key);
                t
            }),
            None => t,
        };

        let tat = stored.max(t);
        let allowed_at = (tat + self.increment_us).saturating_sub(self.period_us);
        if t >= allowed_at {
            self.store.set(&self.key, &(tat + self.increment_us).to_string()).await?;
            Ok(Decision::Permit)
        } else {
            Ok(Decision::Deny { retry_after: Duration::from_micros(allowed_at - t) })
        }
    }
}

#[async_trait]
impl RateLimiter for GcraRateLimiter {
    fn key(&self) -> &str {
        &self.key
    }

    async fn check(&self) -> Decision {
        let guard = match self.lock.acquire().await {
            Ok(Some(guard)) => guard,
            Ok(None) => return self.fallback(),
            Err(e) => {
                warn!("[gcra] '{}' lock error: {e}", self.key);
                return self.fallback();
            }
        };

        let decision = self.decide_locked().await.unwrap_or_else(|e| {
            warn!("[gcra] '{}' store error: {e}", self.key);
            self.fallback()
        });

        if let Err(e) = self.lock.release(guard).await {
            warn!("[gcra] '{}' lock release failed: {e}", self.key);
        }
        decision
    }
}
