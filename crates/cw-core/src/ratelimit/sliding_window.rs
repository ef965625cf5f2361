//! Sliding-window throttle.
//!
//! The store holds a list of admission timestamps (microseconds, oldest at the
//! head). Under the lock, entries older than one `period` are flushed from the
//! head; if fewer than `rate_limit` remain the current time is appended and
//! the request is admitted. Flush, check and append happen in one critical
//! section so concurrent callers cannot overshoot the window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Decision, LockTiming, RateLimiter, limiter_lock, state_key};
use crate::clock::ClockSource;
use crate::config::RateLimitAlgorithm;
use crate::lock::DistributedLock;
use crate::store::{SharedStore, StoreResult};

pub struct SlidingWindowThrottle {
    store: Arc<dyn SharedStore>,
    clock: ClockSource,
    lock: DistributedLock,
    key: String,
    rate_limit: usize,
    period_us: u64,
    retry_interval: Duration,
}

impl SlidingWindowThrottle {
    pub fn new(
        store: Arc<dyn SharedStore>,
        exchange: &str,
        rate_limit: u32,
        period: Duration,
        retry_interval: Duration,
        timing: LockTiming,
    ) -> Self {
        let key = state_key(exchange, RateLimitAlgorithm::SlidingWindow);
        Self {
            clock: ClockSource::new(store.clone()),
            lock: limiter_lock(&store, &key, timing),
            store,
            key,
            rate_limit: rate_limit.max(1) as usize,
            period_us: period.as_micros() as u64,
            retry_interval,
        }
    }

    /// Suspend until the window has room, then record the admission.
    pub async fn acquire(&self) {
        self.wait().await;
    }

    async fn flush(&self, now: u64) -> StoreResult<()> {
        while let Some(oldest) = self.store.list_index(&self.key, 0).await? {
            match oldest.parse::<u64>() {
                Ok(ts) if now.saturating_sub(ts) <= self.period_us => break,
                Ok(_) => {}
                Err(_) => warn!("[sliding_window] '{}' dropping unparsable entry '{oldest}'", self.key),
            }
            self.store.list_pop_front(&self.key).await?;
        }
        Ok(())
    }

    async fn admit_locked(&self) -> StoreResult<Decision> {
        let now = self.clock.now_us().await?;
        self.flush(now).await?;

        if self.store.list_len(&self.key).await? < self.rate_limit {
            self.store.list_push_back(&self.key, &now.to_string()).await?;
            Ok(Decision::Permit)
        } else {
            Ok(Decision::Deny { retry_after: self.retry_interval })
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowThrottle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn check(&self) -> Decision {
        let deny = Decision::Deny { retry_after: self.retry_interval };
        let guard = match self.lock.acquire().await {
            Ok(Some(guard)) => guard,
            Ok(None) => return deny,
            Err(e) => {
                warn!("[sliding_window] '{}' lock error: {e}", self.key);
                return deny;
            }
        };

        let decision = self.admit_locked().await.unwrap_or_else(|e| {
            warn!("[sliding_window] '{}' store error: {e}", self.key);
            deny
        });

        if let Err(e) = self.lock.release(guard).await {
            warn!("[sliding_window] '{}' lock release failed: {e}", self.key);
        }
        decision
    }
}
