//! Redis counter store
//!
//! Shares login counters between every process pointing at the same Redis.
//! Requires the `redis` feature to be enabled.

use super::{ConsumeSpec, CounterState, CounterStore};
use crate::error::{RateLimitError, RateLimitResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

const CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local points = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local block = tonumber(ARGV[4])

local consumed = redis.call('INCRBY', key, points)
local pttl = redis.call('PTTL', key)
if consumed == points or pttl < 0 then
    redis.call('PEXPIRE', key, window)
    pttl = window
end

if block > 0 and consumed >= capacity and consumed - points < capacity then
    redis.call('PEXPIRE', key, block)
    pttl = block
end

return {consumed, pttl}
"#;

/// Redis-backed counter store.
///
/// Counters are plain integer keys with a millisecond TTL; the consume
/// path runs as one Lua script so increments from different processes
/// never interleave.
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connect to `url` (e.g. "redis://localhost:6379").
    pub async fn new(url: &str) -> RateLimitResult<Self> {
        debug!(url = %url, "Connecting to Redis for login limiting");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: "psylab".to_string(),
        })
    }

    /// Connect with a custom key prefix.
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> RateLimitResult<Self> {
        let mut store = Self::new(url).await?;
        store.prefix = prefix.into();
        Ok(store)
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> RateLimitResult<Option<CounterState>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let (consumed, pttl): (Option<u64>, i64) = redis::pipe()
            .get(&full_key)
            .pttl(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        Ok(consumed.map(|consumed| CounterState {
            consumed,
            ms_before_next: pttl.max(0) as u64,
        }))
    }

    async fn consume(&self, key: &str, spec: ConsumeSpec) -> RateLimitResult<CounterState> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let (consumed, pttl): (u64, i64) = redis::Script::new(CONSUME_SCRIPT)
            .key(&full_key)
            .arg(spec.points)
            .arg(spec.window.as_millis() as u64)
            .arg(spec.capacity)
            .arg(spec.block.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        trace!(key = %key, consumed = consumed, "Redis counter consumed");
        Ok(CounterState {
            consumed,
            ms_before_next: pttl.max(0) as u64,
        })
    }

    async fn delete(&self, key: &str) -> RateLimitResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(self.key(key))
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;
        Ok(removed > 0)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}
