//! Login attempt limiting for psylab.
//!
//! Two counters guard login endpoints: failed attempts per client address
//! per day, and consecutive failed attempts per identity and address.
//! [`LoginGuard`] reads them before the handler runs; the handler records
//! outcomes through [`LoginLimiters`].
//!
//! Counters live in a [`CounterStore`]: [`MemoryStore`] for a single
//! process, or `RedisStore` (feature `redis`) shared across instances.
//!
//! ```
//! use psylab_ratelimit::{LoginDecision, LoginLimiters, MemoryStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let limiters = LoginLimiters::with_limits(Arc::new(MemoryStore::new()), 100, 2).unwrap();
//! limiters.record_failure(Some("a@lab.org"), "10.0.0.1").await.unwrap();
//! limiters.record_failure(Some("a@lab.org"), "10.0.0.1").await.unwrap();
//!
//! let decision = limiters.check(Some("a@lab.org"), "10.0.0.1").await.unwrap();
//! assert_eq!(decision, LoginDecision::Blocked { retry_after: 3600 });
//! # });
//! ```

pub mod clock;
mod error;
mod ip;
mod limiter;
mod middleware;
pub mod stores;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RateLimitError, RateLimitResult};
pub use ip::{UNKNOWN_CLIENT, client_ip, client_key};
pub use limiter::{Limiter, LimiterConfig, LoginDecision, LoginLimiters, retry_after_secs};
pub use middleware::{BurstBlock, ClientKey, LoginGuard, body_identity};
pub use stores::{ConsumeSpec, CounterState, CounterStore, MemoryStore};
#[cfg(feature = "redis")]
pub use stores::RedisStore;
