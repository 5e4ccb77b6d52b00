//! Login guard in front of a handler that records failures.

use async_trait::async_trait;
use psylab_core::{Error, HandlerFn, HttpRequest, HttpResponse, MiddlewareChain, handler};
use psylab_ratelimit::{
    ClientKey, ConsumeSpec, CounterState, CounterStore, LoginGuard, LoginLimiters, ManualClock,
    MemoryStore, RateLimitError, RateLimitResult, body_identity,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn login_handler(limiters: Arc<LoginLimiters>) -> HandlerFn {
    handler(move |req: HttpRequest| {
        let limiters = limiters.clone();
        async move {
            let ip = req
                .extensions
                .get::<ClientKey>()
                .cloned()
                .ok_or_else(|| Error::Internal("guard did not run".into()))?;
            let email = body_identity(&req);
            limiters.record_failure(email.as_deref(), &ip.0).await?;
            Err(Error::Unauthorized("Invalid email or password".into()))
        }
    })
}

fn attempt(email: &str) -> HttpRequest {
    let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();
    HttpRequest::new("POST", "/api/users/login")
        .with_remote_addr(peer)
        .with_body(format!(r#"{{"email":"{email}","password":"wrong"}}"#))
}

#[tokio::test]
async fn test_fourth_attempt_is_rejected_until_block_lifts() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let limiters = Arc::new(LoginLimiters::with_limits(store, 100, 3).unwrap());
    let chain = MiddlewareChain::new().with(LoginGuard::by_identity_and_ip(limiters.clone()));

    for _ in 0..3 {
        let err = chain
            .apply(attempt("a@lab.org"), login_handler(limiters.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    let res = chain
        .apply(attempt("a@lab.org"), login_handler(limiters.clone()))
        .await
        .unwrap();
    assert_eq!(res.status, 429);
    let retry: u64 = res.header("retry-after").unwrap().parse().unwrap();
    assert!(retry > 0 && retry <= 3600);
    assert_eq!(&res.body.collect().await.unwrap()[..], b"Too Many Requests");

    clock.advance(Duration::from_secs(3601));
    let err = chain
        .apply(attempt("a@lab.org"), login_handler(limiters.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_ip_guard_ignores_identity() {
    let clock = Arc::new(ManualClock::new(0));
    let store = Arc::new(MemoryStore::with_clock(clock));
    let limiters = Arc::new(LoginLimiters::with_limits(store, 2, 10).unwrap());
    let chain = MiddlewareChain::new().with(LoginGuard::by_ip(limiters.clone()));

    for email in ["a@lab.org", "b@lab.org"] {
        let _ = chain
            .apply(attempt(email), login_handler(limiters.clone()))
            .await;
    }

    let res = chain
        .apply(attempt("c@lab.org"), login_handler(limiters.clone()))
        .await
        .unwrap();
    assert_eq!(res.status, 429);
    assert_eq!(res.header("retry-after"), Some("86400"));
}

#[tokio::test]
async fn test_ip_ceiling_blocks_for_a_day() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let limiters = Arc::new(LoginLimiters::with_limits(store, 3, 10).unwrap());
    let chain = MiddlewareChain::new().with(LoginGuard::by_ip(limiters.clone()));

    for email in ["a@lab.org", "b@lab.org", "c@lab.org"] {
        let err = chain
            .apply(attempt(email), login_handler(limiters.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    let res = chain
        .apply(attempt("d@lab.org"), login_handler(limiters.clone()))
        .await
        .unwrap();
    assert_eq!(res.status, 429);
    assert_eq!(res.header("retry-after"), Some("86400"));

    clock.advance(Duration::from_secs(86_400 + 1));
    let err = chain
        .apply(attempt("d@lab.org"), login_handler(limiters.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
}

struct BrokenStore;

#[async_trait]
impl CounterStore for BrokenStore {
    async fn get(&self, _key: &str) -> RateLimitResult<Option<CounterState>> {
        Err(RateLimitError::store("connection refused"))
    }

    async fn consume(&self, _key: &str, _spec: ConsumeSpec) -> RateLimitResult<CounterState> {
        Err(RateLimitError::store("connection refused"))
    }

    async fn delete(&self, _key: &str) -> RateLimitResult<bool> {
        Err(RateLimitError::store("connection refused"))
    }

    fn store_type(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let limiters = Arc::new(LoginLimiters::new(Arc::new(BrokenStore)).unwrap());
    let chain = MiddlewareChain::new().with(LoginGuard::by_identity_and_ip(limiters.clone()));

    let ok = handler(|_req: HttpRequest| async { Ok(HttpResponse::ok()) });
    let err = chain.apply(attempt("a@lab.org"), ok).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_scoped_guard_passes_other_routes() {
    let limiters = Arc::new(LoginLimiters::new(Arc::new(BrokenStore)).unwrap());
    let chain = MiddlewareChain::new()
        .with(LoginGuard::by_identity_and_ip(limiters).only("POST", "/api/users/login"));

    let ok = handler(|_req: HttpRequest| async { Ok(HttpResponse::ok()) });
    let res = chain
        .apply(HttpRequest::new("GET", "/health"), ok.clone())
        .await
        .unwrap();
    assert_eq!(res.status, 200);

    let err = chain.apply(attempt("a@lab.org"), ok).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
}
