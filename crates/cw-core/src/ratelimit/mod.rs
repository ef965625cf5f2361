//! Client-side request rate limiting shared across processes.
//!
//! Each limiter keeps its whole state in the shared store under
//! `ratelimit:{exchange}:{algorithm}` and mutates it only while holding the
//! distributed lock `lock:ratelimit:{exchange}:{algorithm}`. Every fetcher
//! process configured with the same exchange therefore draws from one budget.
//!
//! Three interchangeable algorithms implement [`RateLimiter`]:
//!
//! - [`GcraRateLimiter`] — generic cell rate algorithm (theoretical arrival time)
//! - [`LeakyBucketRateLimiter`] — token pool refilled by key expiry
//! - [`SlidingWindowThrottle`] — log of request timestamps in a trailing window
//!
//! Any failure to reach the store or to take the lock is a denial. A limiter
//! never grants a request it could not account for.

pub mod gcra;
pub mod leaky_bucket;
pub mod sliding_window;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{RateLimitAlgorithm, RateLimitConfig};
use crate::lock::DistributedLock;
use crate::store::SharedStore;

pub use self::gcra::GcraRateLimiter;
pub use self::leaky_bucket::LeakyBucketRateLimiter;
pub use self::sliding_window::SlidingWindowThrottle;

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny { retry_after: Duration },
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        matches!(self, Self::Permit)
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// State key in the shared store.
    fn key(&self) -> &str;

    /// One admission attempt. Never errors: store trouble is a denial.
    async fn check(&self) -> Decision;

    /// Delay applied after a permit, outside the lock, to smooth bursts.
    fn pace_after_permit(&self) -> Option<Duration> {
        None
    }

    /// Suspend until a request may be sent.
    async fn wait(&self) {
        loop {
            match self.check().await {
                Decision::Permit => {
                    if let Some(pace) = self.pace_after_permit() {
                        tokio::time::sleep(pace).await;
                    }
                    return;
                }
                Decision::Deny { retry_after } => tokio::time::sleep(retry_after).await,
            }
        }
    }
}

/// `ratelimit:{exchange}:{algorithm}`
pub fn state_key(exchange: &str, algorithm: RateLimitAlgorithm) -> String {
    format!("ratelimit:{exchange}:{}", algorithm.as_str())
}

/// `lock:` + the state key.
pub fn lock_key(state_key: &str) -> String {
    format!("lock:{state_key}")
}

/// Lock lease and bounded acquisition wait for limiter critical sections.
#[derive(Debug, Clone, Copy)]
pub struct LockTiming {
    pub lease: Duration,
    pub wait: Duration,
}

impl Default for LockTiming {
    fn default() -> Self {
        Self { lease: Duration::from_secs(5), wait: Duration::from_millis(10) }
    }
}

pub(crate) fn limiter_lock(store: &Arc<dyn SharedStore>, key: &str, timing: LockTiming) -> DistributedLock {
    DistributedLock::new(store.clone(), lock_key(key), timing.lease, timing.wait)
}

/// Build the limiter selected by `config` for `exchange`.
pub fn build_rate_limiter(
    store: Arc<dyn SharedStore>,
    exchange: &str,
    config: &RateLimitConfig,
    timing: LockTiming,
) -> Arc<dyn RateLimiter> {
    match config.algorithm {
        RateLimitAlgorithm::Gcra => {
            Arc::new(GcraRateLimiter::new(store, exchange, config.rate_limit, config.period(), timing))
        }
        RateLimitAlgorithm::LeakyBucket => Arc::new(LeakyBucketRateLimiter::new(
            store,
            exchange,
            config.rate_limit,
            config.period(),
            config.retry_interval(),
            timing,
        )),
        RateLimitAlgorithm::SlidingWindow => Arc::new(SlidingWindowThrottle::new(
            store,
            exchange,
            config.rate_limit,
            config.period(),
            config.retry_interval(),
            timing,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn keys_are_scoped_by_algorithm() {
        let key = state_key("binance", RateLimitAlgorithm::SlidingWindow);
        assert_eq!(key, "ratelimit:binance:sliding_window");
        assert_eq!(lock_key(&key), "lock:ratelimit:binance:sliding_window");
    }

    #[tokio::test]
    async fn factory_selects_algorithm() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let config = RateLimitConfig {
            algorithm: RateLimitAlgorithm::LeakyBucket,
            rate_limit: 2,
            period_ms: 1_000,
            retry_interval_ms: None,
        };
        let limiter = build_rate_limiter(store, "bittrex", &config, LockTiming::default());
        assert_eq!(limiter.key(), "ratelimit:bittrex:leaky_bucket");
        assert!(limiter.check().await.is_permit());
    }
}
