//! Leaky-bucket limiter.
//!
//! The bucket is a counter created with `rate_limit` tokens and an expiry of
//! one `period`; when the key expires the next caller recreates it full. Each
//! permitted request removes one token and is then delayed by
//! `period / rate_limit` to spread the burst.
//!
//! The stored count never goes below zero: the check and the decrement are a
//! single store operation that leaves an empty or missing bucket untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Decision, LockTiming, RateLimiter, limiter_lock, state_key};
use crate::config::RateLimitAlgorithm;
use crate::lock::DistributedLock;
use crate::store::{SharedStore, StoreResult};

pub struct LeakyBucketRateLimiter {
    store: Arc<dyn SharedStore>,
    lock: DistributedLock,
    key: String,
    rate_limit: u32,
    period: Duration,
    separation: Duration,
    retry_interval: Duration,
}

impl LeakyBucketRateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        exchange: &str,
        rate_limit: u32,
        period: Duration,
        retry_interval: Duration,
        timing: LockTiming,
    ) -> Self {
        let key = state_key(exchange, RateLimitAlgorithm::LeakyBucket);
        let rate_limit = rate_limit.max(1);
        Self {
            lock: limiter_lock(&store, &key, timing),
            store,
            key,
            rate_limit,
            period,
            separation: period / rate_limit,
            retry_interval,
        }
    }

    async fn take_token_locked(&self) -> StoreResult<Decision> {
        // Created full with the refill period as its lifetime.
        self.store
            .set_nx_px(&self.key, &self.rate_limit.to_string(), self.period)
            .await?;

        match self.store.decr_if_positive(&self.key).await? {
            Some(_) => Ok(Decision::Permit),
            None => Ok(Decision::Deny { retry_after: self.retry_interval }),
        }
    }
}

#[async_trait]
impl RateLimiter for LeakyBucketRateLimiter {
    fn key(&self) -> &str {
        &self.key
    }

    async fn check(&self) -> Decision {
        let deny = Decision::Deny { retry_after: self.retry_interval };
        let guard = match self.lock.acquire().await {
            Ok(Some(guard)) => guard,
            Ok(None) => return deny,
            Err(e) => {
                warn!("[leaky_bucket] '{}' lock error: {e}", self.key);
                return deny;
            }
        };

        let decision = self.take_token_locked().await.unwrap_or_else(|e| {
            warn!("[leaky_bucket] '{}' store error: {e}", self.key);
            deny
        });

        if let Err(e) = self.lock.release(guard).await {
            warn!("[leaky_bucket] '{}' lock release failed: {e}", self.key);
        }
        decision
    }

    fn pace_after_permit(&self) -> Option<Duration> {
        Some(self.separation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(store: &Arc<MemoryStore>, rate: u32) -> LeakyBucketRateLimiter {
        LeakyBucketRateLimiter::new(
            store.clone(),
            "binance",
            rate,
            Duration::from_secs(1),
            Duration::from_millis(10),
            LockTiming::default(),
        )
    }

    async fn tokens(store: &MemoryStore, key: &str) -> Option<i64> {
        store.get(key).await.unwrap().map(|v| v.parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_denies_without_going_negative() {
        let store = Arc::new(MemoryStore::new());
        let bucket = limiter(&store, 3);
        for _ in 0..3 {
            assert!(bucket.check().await.is_permit());
        }
        for _ in 0..5 {
            assert!(!bucket.check().await.is_permit());
        }
        assert_eq!(tokens(&store, bucket.key()).await, Some(0));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.check().await.is_permit());
        assert_eq!(tokens(&store, bucket.key()).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_drive_count_negative() {
        let store = Arc::new(MemoryStore::new());
        let key = limiter(&store, 5).key().to_string();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = Arc::new(limiter(&store, 5));
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..4 {
                    bucket.wait().await;
                    if let Some(n) = tokens(&store, &key).await {
                        assert!(n >= 0, "observed {n} tokens");
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        if let Some(n) = tokens(&store, &key).await {
            assert!(n >= 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permit_is_smoothed_by_separation() {
        let store = Arc::new(MemoryStore::new());
        let bucket = limiter(&store, 4);
        let started = tokio::time::Instant::now();
        bucket.wait().await;
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn store_outage_fails_safe() {
        let store = Arc::new(MemoryStore::new());
        let bucket = limiter(&store, 4);
        store.set_offline(true);
        assert_eq!(bucket.check().await, Decision::Deny { retry_after: Duration::from_millis(10) });
    }
}
