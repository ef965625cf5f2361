//! Authoritative time read from the shared store.
//!
//! Cooperating processes may run on machines whose wall clocks disagree;
//! every rate-limit decision therefore uses the store server's clock.

use std::sync::Arc;

use crate::store::{SharedStore, StoreResult};

#[derive(Clone)]
pub struct ClockSource {
    store: Arc<dyn SharedStore>,
}

impl ClockSource {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Store time in microseconds since Unix epoch.
    pub async fn now_us(&self) -> StoreResult<u64> {
        self.store.server_time_us().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn follows_store_time() {
        let clock = ClockSource::new(Arc::new(MemoryStore::new()));
        let t0 = clock.now_us().await.unwrap();
        tokio::time::advance(Duration::from_millis(250)).await;
        let t1 = clock.now_us().await.unwrap();
        assert_eq!(t1 - t0, 250_000);
    }
}
