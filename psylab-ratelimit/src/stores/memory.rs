//! In-memory counter store

use super::{ConsumeSpec, CounterState, CounterStore};
use crate::RateLimitResult;
use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct Counter {
    consumed: u64,
    expires_at: u64,
}

impl Counter {
    fn state(&self, now: u64) -> CounterState {
        CounterState {
            consumed: self.consumed,
            ms_before_next: self.expires_at.saturating_sub(now),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// Single-process counter store backed by DashMap.
///
/// Expired counters are dropped lazily on access and by [`MemoryStore::cleanup`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    counters: Arc<DashMap<String, Counter>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a new in-memory store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        debug!("Creating in-memory counter store");
        Self {
            counters: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Drop every expired counter.
    pub fn cleanup(&self) {
        let now = self.clock.now_ms();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.is_live(now));
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired counters");
        }
    }

    /// Number of tracked keys, expired ones included.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> RateLimitResult<Option<CounterState>> {
        let now = self.clock.now_ms();
        let state = self
            .counters
            .get(key)
            .filter(|c| c.is_live(now))
            .map(|c| c.state(now));
        if state.is_none() {
            self.counters.remove_if(key, |_, c| !c.is_live(now));
        }
        Ok(state)
    }

    async fn consume(&self, key: &str, spec: ConsumeSpec) -> RateLimitResult<CounterState> {
        let now = self.clock.now_ms();
        let window = spec.window.as_millis() as u64;

        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            consumed: 0,
            expires_at: now + window,
        });
        let counter = entry.value_mut();
        if !counter.is_live(now) {
            *counter = Counter {
                consumed: 0,
                expires_at: now + window,
            };
        }

        let before = counter.consumed;
        counter.consumed = before.saturating_add(spec.points);
        if !spec.block.is_zero() && before < spec.capacity && counter.consumed >= spec.capacity {
            counter.expires_at = now + spec.block.as_millis() as u64;
            debug!(key = key, block_ms = spec.block.as_millis() as u64, "Counter blocked");
        }

        let state = counter.state(now);
        trace!(key = key, consumed = state.consumed, "Counter consumed");
        Ok(state)
    }

    async fn delete(&self, key: &str) -> RateLimitResult<bool> {
        Ok(self.counters.remove(key).is_some())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
