//! Redis-backed [`SharedStore`].
//!
//! Uses a [`ConnectionManager`] so a dropped connection is re-established
//! transparently; individual commands fail while the server is unreachable
//! and callers decide how to degrade (rate limiters deny, candle writes are
//! logged and dropped).

use std::collections::HashMap;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use tracing::info;

use super::{SharedStore, StoreResult};
use crate::error::StoreError;

/// Decrement only an existing, positive counter. Returns -1 when untouched.
const DECR_IF_POSITIVE: &str = r#"
local v = tonumber(redis.call('GET', KEYS[1]))
if v and v > 0 then
    return redis.call('DECR', KEYS[1])
end
return -1
"#;

/// Compare-and-delete used to release a lock only by its holder.
const DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// ARGV: time_field, time, then field/value pairs.
const HASH_REPLACE_IF_NEWER: &str = r#"
local cur = redis.call('HGET', KEYS[1], ARGV[1])
if cur and tonumber(cur) > tonumber(ARGV[2]) then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2], unpack(ARGV, 3))
return 1
"#;

/// Redis connection wrapper implementing [`SharedStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    decr_if_positive: Script,
    delete_if_equals: Script,
    hash_replace_if_newer: Script,
}

impl RedisStore {
    /// Open a managed connection to `url` (`redis://[:password@]host:port/db`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        info!("connecting to shared store");
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("shared store connection established");

        Ok(Self {
            conn,
            decr_if_positive: Script::new(DECR_IF_POSITIVE),
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
            hash_replace_if_newer: Script::new(HASH_REPLACE_IF_NEWER),
        })
    }

    /// Round-trip a `PING`.
    pub async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn server_time_us(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let (secs, micros): (u64, u64) = ::redis::cmd("TIME").query_async(&mut conn).await?;
        Ok(secs * 1_000_000 + micros)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx(key, value).await?)
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self.delete_if_equals.key(key).arg(value).invoke_async(&mut conn).await?;
        Ok(deleted > 0)
    }

    async fn decr_if_positive(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: i64 = self.decr_if_positive.key(key).invoke_async(&mut conn).await?;
        Ok((value >= 0).then_some(value))
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(key).await?)
    }

    async fn list_index(&self, key: &str, index: isize) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lindex(key, index).await?)
    }

    async fn list_pop_front(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(key, None).await?)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.rpush(key, value).await?)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_replace_if_newer(
        &self,
        key: &str,
        time_field: &str,
        time: u64,
        fields: &[(&str, String)],
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.hash_replace_if_newer.key(key);
        invocation.arg(time_field).arg(time);
        for (field, value) in fields {
            invocation.arg(*field).arg(value.as_str());
        }
        let written: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(written == 1)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(StoreError::from)
    }
}
