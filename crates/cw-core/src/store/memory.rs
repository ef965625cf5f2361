//! In-process [`SharedStore`] with Redis-equivalent semantics.
//!
//! Time is derived from the tokio clock (`epoch at construction + elapsed`),
//! so `#[tokio::test(start_paused = true)]` tests see deterministic server time
//! and key expiry. A store can be switched offline to exercise the
//! store-unavailable paths.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{SharedStore, StoreResult};
use crate::error::StoreError;
use crate::time_util;

#[derive(Debug)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, StringEntry>,
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    /// Drop the string at `key` if its expiry has passed, then return it.
    fn live_string(&mut self, key: &str) -> Option<&mut StringEntry> {
        let expired = self
            .strings
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }
}

/// Single-process store backend.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    origin: Instant,
    epoch_us: u64,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            origin: Instant::now(),
            epoch_us: time_util::now_us(),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with [`StoreError::Backend`] (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn server_time_us(&self) -> StoreResult<u64> {
        self.ensure_online()?;
        Ok(self.epoch_us + self.origin.elapsed().as_micros() as u64)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        Ok(inner.live_string(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        inner.strings.insert(
            key.to_string(),
            StringEntry { value: value.to_string(), expires_at: None },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        if inner.live_string(key).is_some() {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry { value: value.to_string(), expires_at: None },
        );
        Ok(true)
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        if inner.live_string(key).is_some() {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry { value: value.to_string(), expires_at: Some(Instant::now() + ttl) },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let matches = inner.live_string(key).is_some_and(|e| e.value == value);
        if matches {
            inner.strings.remove(key);
        }
        Ok(matches)
    }

    async fn decr_if_positive(&self, key: &str) -> StoreResult<Option<i64>> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.live_string(key) else {
            return Ok(None);
        };
        let current: i64 = entry.value.parse().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            value: entry.value.clone(),
        })?;
        if current <= 0 {
            return Ok(None);
        }
        entry.value = (current - 1).to_string();
        Ok(Some(current - 1))
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.lists.get(key).map_or(0, |l| l.len()))
    }

    async fn list_index(&self, key: &str, index: isize) -> StoreResult<Option<String>> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(None);
        };
        let len = list.len() as isize;
        let idx = if index < 0 { len + index } else { index };
        if idx < 0 || idx >= len {
            return Ok(None);
        }
        Ok(list.get(idx as usize).cloned())
    }

    async fn list_pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let popped = inner.lists.get_mut(key).and_then(|l| l.pop_front());
        if inner.lists.get(key).is_some_and(|l| l.is_empty()) {
            inner.lists.remove(key);
        }
        Ok(popped)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_replace_if_newer(
        &self,
        key: &str,
        time_field: &str,
        time: u64,
        fields: &[(&str, String)],
    ) -> StoreResult<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        if let Some(current) = hash.get(time_field) {
            let current: u64 = current.parse().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                value: current.clone(),
            })?;
            if current > time {
                return Ok(false);
            }
        }
        hash.insert(time_field.to_string(), time.to_string());
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(true)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        Ok(inner.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}
