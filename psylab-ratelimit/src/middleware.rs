//! Rate limiting middleware

use crate::clock::{Clock, SystemClock};
use crate::ip::client_key;
use crate::limiter::{LoginDecision, LoginLimiters, retry_after_secs};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use psylab_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use psylab_session::SessionExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

/// Counter key of the client, as seen by the guard that admitted the request.
///
/// Login handlers pass it to [`LoginLimiters::record_failure`] so failures
/// land on the same counters the guard reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

fn too_many_requests(retry_after: u64) -> HttpResponse {
    HttpResponse::new(429)
        .with_header(http::header::RETRY_AFTER, retry_after.to_string())
        .with_text("Too Many Requests")
}

/// The `email` field of a JSON request body.
pub fn body_identity(req: &HttpRequest) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(&req.body)
        .ok()?
        .get("email")?
        .as_str()
        .map(str::to_owned)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardScope {
    Ip,
    IdentityAndIp,
}

/// Pre-check for login endpoints.
///
/// Reads the login counters without consuming them and answers 429 with
/// `Retry-After` while a block is active. A counter-store failure fails
/// the request with a 500.
///
/// Mounted globally with [`LoginGuard::only`], it checks one route and
/// passes every other request straight through, so it can sit ahead of
/// session decoding and compression.
#[derive(Debug, Clone)]
pub struct LoginGuard {
    limiters: Arc<LoginLimiters>,
    scope: GuardScope,
    trust_proxy: bool,
    route: Option<(String, String)>,
}

impl LoginGuard {
    /// Check the per-address counter only.
    pub fn by_ip(limiters: Arc<LoginLimiters>) -> Self {
        Self {
            limiters,
            scope: GuardScope::Ip,
            trust_proxy: false,
            route: None,
        }
    }

    /// Check the per-address counter and the identity's consecutive counter.
    pub fn by_identity_and_ip(limiters: Arc<LoginLimiters>) -> Self {
        Self {
            limiters,
            scope: GuardScope::IdentityAndIp,
            trust_proxy: false,
            route: None,
        }
    }

    /// Take the client address from `X-Forwarded-For`.
    pub fn with_trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    /// Guard only `method path`; a trailing slash on the request is ignored.
    pub fn only(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.route = Some((method.into(), path.into()));
        self
    }

    fn applies_to(&self, req: &HttpRequest) -> bool {
        match &self.route {
            None => true,
            Some((method, path)) => {
                method.eq_ignore_ascii_case(&req.method)
                    && req.path.trim_end_matches('/') == path.trim_end_matches('/')
            }
        }
    }
}

#[async_trait]
impl Middleware for LoginGuard {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        if !self.applies_to(&req) {
            return next(req).await;
        }
        let ip = client_key(&req, self.trust_proxy);
        let identity = match self.scope {
            GuardScope::Ip => None,
            GuardScope::IdentityAndIp => body_identity(&req),
        };

        match self.limiters.check(identity.as_deref(), &ip).await {
            Ok(LoginDecision::Allowed) => {
                debug!(ip = %ip, "Login attempt allowed");
                req.extensions.insert(ClientKey(ip));
                next(req).await
            }
            Ok(LoginDecision::Blocked { retry_after }) => Ok(too_many_requests(retry_after)),
            Err(e) => {
                error!(ip = %ip, error = %e, "Login limiter store failed");
                Err(e.into())
            }
        }
    }
}

/// One request per window per client, tracked in process memory.
///
/// The client is the session identity when one is present, else the
/// address. State lives in this process only: it is lost on restart and
/// not shared between instances.
#[derive(Debug, Clone)]
pub struct BurstBlock {
    blocked: Arc<DashMap<String, u64>>,
    last_purge: Arc<AtomicU64>,
    window: Duration,
    clock: Arc<dyn Clock>,
    trust_proxy: bool,
}

impl BurstBlock {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            blocked: Arc::new(DashMap::new()),
            last_purge: Arc::new(AtomicU64::new(0)),
            window,
            clock,
            trust_proxy: false,
        }
    }

    pub fn with_trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    fn key(&self, req: &HttpRequest) -> String {
        req.session()
            .and_then(|s| s.id.clone())
            .unwrap_or_else(|| client_key(req, self.trust_proxy))
    }

    /// Admit `key`, or return the remaining block.
    pub fn admit(&self, key: &str) -> Result<(), Duration> {
        let now = self.clock.now_ms();
        let until = now + self.window.as_millis() as u64;
        match self.blocked.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let expires = *entry.get();
                if expires > now {
                    return Err(Duration::from_millis(expires - now));
                }
                entry.insert(until);
            }
            Entry::Vacant(entry) => {
                entry.insert(until);
            }
        }
        Ok(())
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = self.clock.now_ms();
        self.last_purge.store(now, Ordering::Relaxed);
        self.blocked.retain(|_, expires| *expires > now);
    }

    /// Purge at most once per window.
    fn maybe_purge(&self) {
        let now = self.clock.now_ms();
        let last = self.last_purge.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.window.as_millis() as u64 {
            return;
        }
        // Only the caller that wins the swap walks the map.
        if self
            .last_purge
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.blocked.retain(|_, expires| *expires > now);
        }
    }

    pub fn tracked(&self) -> usize {
        self.blocked.len()
    }
}

#[async_trait]
impl Middleware for BurstBlock {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let key = self.key(&req);
        if let Err(wait) = self.admit(&key) {
            info!(client = %key, "Burst blocked");
            return Ok(too_many_requests(retry_after_secs(wait)));
        }
        self.maybe_purge();
        next(req).await
    }
}
