//! Fixed-window limiters and the login limiter pair.

use crate::stores::{ConsumeSpec, CounterState, CounterStore};
use crate::{RateLimitError, RateLimitResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings of one limiter.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Namespace prepended to every key.
    pub key_prefix: String,
    /// Points allowed per window.
    pub points: u64,
    /// Window length.
    pub duration: Duration,
    /// Block length once `points` is reached.
    pub block_duration: Duration,
}

impl LimiterConfig {
    pub fn new(key_prefix: impl Into<String>, points: u64, duration: Duration) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            points,
            duration,
            block_duration: Duration::ZERO,
        }
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block_duration = block;
        self
    }

    pub fn validate(&self) -> RateLimitResult<()> {
        if self.points == 0 {
            return Err(RateLimitError::config(format!(
                "{}: points must be greater than 0",
                self.key_prefix
            )));
        }
        if self.duration.is_zero() {
            return Err(RateLimitError::config(format!(
                "{}: duration must be greater than 0",
                self.key_prefix
            )));
        }
        Ok(())
    }
}

/// A fixed-window counter over a [`CounterStore`].
#[derive(Clone)]
pub struct Limiter {
    config: LimiterConfig,
    store: Arc<dyn CounterStore>,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("config", &self.config)
            .field("store", &self.store.store_type())
            .finish()
    }
}

impl Limiter {
    pub fn new(config: LimiterConfig, store: Arc<dyn CounterStore>) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Current counter for `key`, if one is live.
    pub async fn get(&self, key: &str) -> RateLimitResult<Option<CounterState>> {
        self.store.get(&self.key(key)).await
    }

    /// Record one point against `key`.
    pub async fn consume(&self, key: &str) -> RateLimitResult<CounterState> {
        self.store
            .consume(
                &self.key(key),
                ConsumeSpec {
                    points: 1,
                    window: self.config.duration,
                    capacity: self.config.points,
                    block: self.config.block_duration,
                },
            )
            .await
    }

    /// Forget `key`.
    pub async fn delete(&self, key: &str) -> RateLimitResult<bool> {
        self.store.delete(&self.key(key)).await
    }

    /// Remaining block time when `state` has reached the ceiling.
    pub fn blocked_for(&self, state: Option<&CounterState>) -> Option<Duration> {
        state
            .filter(|s| s.consumed >= self.config.points)
            .map(|s| Duration::from_millis(s.ms_before_next))
    }
}

/// Seconds for a `Retry-After` header: rounded, never below one.
pub fn retry_after_secs(wait: Duration) -> u64 {
    ((wait.as_millis() as f64 / 1000.0).round() as u64).max(1)
}

/// Outcome of a login pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginDecision {
    Allowed,
    Blocked { retry_after: u64 },
}

/// The two login failure counters.
///
/// `by_ip` counts every failed login from an address over a day.
/// `by_identity_and_ip` counts consecutive failures of one identity from
/// one address and is reset by a successful login.
#[derive(Debug, Clone)]
pub struct LoginLimiters {
    by_ip: Limiter,
    by_identity_and_ip: Limiter,
}

impl LoginLimiters {
    pub const IP_PREFIX: &'static str = "login_fail_ip_per_day";
    pub const CONSECUTIVE_PREFIX: &'static str = "login_fail_consecutive_username_and_ip";

    /// Limiters with the default ceilings: 100 failures per address per day,
    /// 10 consecutive failures per identity and address.
    pub fn new(store: Arc<dyn CounterStore>) -> RateLimitResult<Self> {
        Self::with_limits(store, 100, 10)
    }

    pub fn with_limits(
        store: Arc<dyn CounterStore>,
        attempts_per_day: u64,
        consecutive_attempts: u64,
    ) -> RateLimitResult<Self> {
        let by_ip = Limiter::new(
            LimiterConfig::new(Self::IP_PREFIX, attempts_per_day, DAY).with_block(DAY),
            store.clone(),
        )?;
        let by_identity_and_ip = Limiter::new(
            LimiterConfig::new(Self::CONSECUTIVE_PREFIX, consecutive_attempts, DAY * 90)
                .with_block(Duration::from_secs(60 * 60)),
            store,
        )?;
        Ok(Self {
            by_ip,
            by_identity_and_ip,
        })
    }

    pub fn by_ip(&self) -> &Limiter {
        &self.by_ip
    }

    pub fn by_identity_and_ip(&self) -> &Limiter {
        &self.by_identity_and_ip
    }

    pub fn identity_key(identity: &str, ip: &str) -> String {
        format!("{identity}_{ip}")
    }

    /// Whether a login attempt may proceed.
    ///
    /// Both counters are read concurrently; the per-address block wins
    /// when both apply.
    pub async fn check(&self, identity: Option<&str>, ip: &str) -> RateLimitResult<LoginDecision> {
        let consecutive = async {
            match identity {
                Some(id) => {
                    self.by_identity_and_ip
                        .get(&Self::identity_key(id, ip))
                        .await
                }
                None => Ok(None),
            }
        };
        let (ip_state, identity_state) = futures::try_join!(self.by_ip.get(ip), consecutive)?;

        let wait = self
            .by_ip
            .blocked_for(ip_state.as_ref())
            .or_else(|| self.by_identity_and_ip.blocked_for(identity_state.as_ref()));

        Ok(match wait {
            Some(wait) => {
                let retry_after = retry_after_secs(wait);
                info!(ip = %ip, retry_after = retry_after, "Login attempt blocked");
                LoginDecision::Blocked { retry_after }
            }
            None => LoginDecision::Allowed,
        })
    }

    /// Count a failed login against both counters.
    pub async fn record_failure(&self, identity: Option<&str>, ip: &str) -> RateLimitResult<()> {
        let consecutive = async {
            match identity {
                Some(id) => self
                    .by_identity_and_ip
                    .consume(&Self::identity_key(id, ip))
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let (ip_state, _) = futures::try_join!(self.by_ip.consume(ip), consecutive)?;
        debug!(ip = %ip, failures = ip_state.consumed, "Login failure recorded");
        Ok(())
    }

    /// A successful login resets the consecutive counter.
    pub async fn record_success(&self, identity: &str, ip: &str) -> RateLimitResult<()> {
        self.by_identity_and_ip
            .delete(&Self::identity_key(identity, ip))
            .await?;
        Ok(())
    }
}
