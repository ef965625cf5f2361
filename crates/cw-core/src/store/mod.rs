//! Shared key-value store abstraction.
//!
//! Every piece of cross-process state (rate-limiter budgets, locks, candle
//! history and serving slots, symbol metadata) lives behind [`SharedStore`].
//! Two backends are provided:
//!
//! - [`RedisStore`] — production backend over a Redis-compatible service.
//! - [`MemoryStore`] — single-process backend with the same semantics, used by
//!   tests and local dry runs. Expiry follows the tokio clock so paused-time
//!   tests can drive it.
//!
//! Multi-step operations that must be atomic across processes
//! ([`decr_if_positive`](SharedStore::decr_if_positive),
//! [`delete_if_equals`](SharedStore::delete_if_equals),
//! [`hash_replace_if_newer`](SharedStore::hash_replace_if_newer)) are single
//! trait calls so each backend can execute them indivisibly.

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Server-authoritative time, microseconds since Unix epoch.
    async fn server_time_us(&self) -> StoreResult<u64>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set only if the key is absent. Returns `true` if the value was written.
    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Set-if-absent with an expiry. Returns `true` if the value was written.
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Decrement an integer key only when it exists and is `> 0`.
    ///
    /// Returns the new value, or `None` when nothing was decremented. The key's
    /// expiry is preserved.
    async fn decr_if_positive(&self, key: &str) -> StoreResult<Option<i64>>;

    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    async fn list_index(&self, key: &str, index: isize) -> StoreResult<Option<String>>;

    async fn list_pop_front(&self, key: &str) -> StoreResult<Option<String>>;

    /// Append to the tail of a list, returning the new length.
    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<usize>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Replace a hash record unless it already holds a newer `time_field`.
    ///
    /// Writes `time_field = time` together with every `(field, value)` pair when
    /// the stored time is absent or `<= time`. Returns `true` if written.
    async fn hash_replace_if_newer(
        &self,
        key: &str,
        time_field: &str,
        time: u64,
        fields: &[(&str, String)],
    ) -> StoreResult<bool>;

    /// Add a member to a set. Returns `true` if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;
}
