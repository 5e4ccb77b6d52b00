//! Counter storage backends.
//!
//! A store keeps one counter per key together with its expiry. Each
//! [`CounterStore::consume`] call is atomic with respect to other calls on
//! the same key, so concurrent failures on one key never lose increments.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

use crate::RateLimitResult;
use async_trait::async_trait;
use std::time::Duration;

/// Snapshot of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Points consumed in the current window.
    pub consumed: u64,
    /// Milliseconds until the counter (or its block) expires.
    pub ms_before_next: u64,
}

/// Parameters of a single consume call.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeSpec {
    /// Points to add.
    pub points: u64,
    /// Lifetime of a freshly started counter.
    pub window: Duration,
    /// Ceiling at which the counter blocks.
    pub capacity: u64,
    /// Block length once the ceiling is reached. Zero keeps the window.
    pub block: Duration,
}

/// Trait for rate limit counter backends.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current state of a live counter.
    async fn get(&self, key: &str) -> RateLimitResult<Option<CounterState>>;

    /// Add points to a counter, starting it if absent or expired.
    ///
    /// When the addition takes the counter to or past `capacity` and a block
    /// duration is set, the counter's expiry moves to now plus the block.
    async fn consume(&self, key: &str, spec: ConsumeSpec) -> RateLimitResult<CounterState>;

    /// Remove a counter. Returns whether it existed.
    async fn delete(&self, key: &str) -> RateLimitResult<bool>;

    /// Backend name for logs.
    fn store_type(&self) -> &'static str;
}
