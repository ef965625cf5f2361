//! Best-effort distributed mutual exclusion over the shared store.
//!
//! Acquisition writes a random token with `SET key token NX PX lease`; the hard
//! lease bounds how long a crashed holder can block others. Callers wait at
//! most `wait` for the key to become free and then give up; a failed
//! acquisition must never be treated as permission.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::store::{SharedStore, StoreResult};

/// Poll period while waiting for a held lock.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Lock factory bound to one key.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn SharedStore>,
    key: String,
    lease: Duration,
    wait: Duration,
}

/// Proof of ownership. Must be handed back to [`DistributedLock::release`].
#[derive(Debug)]
pub struct LockGuard {
    token: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>, lease: Duration, wait: Duration) -> Self {
        Self { store, key: key.into(), lease, wait }
    }

    /// Try to take the lock, polling until the bounded wait elapses.
    ///
    /// Returns `Ok(None)` when the lock stayed busy for the whole wait.
    pub async fn acquire(&self) -> StoreResult<Option<LockGuard>> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;
        loop {
            if self.store.set_nx_px(&self.key, &token, self.lease).await? {
                return Ok(Some(LockGuard { token }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Release a held lock. A lease that already expired is logged, not an error.
    pub async fn release(&self, guard: LockGuard) -> StoreResult<()> {
        if !self.store.delete_if_equals(&self.key, &guard.token).await? {
            warn!("[lock] '{}' lease expired before release", self.key);
        }
        Ok(())
    }
}
