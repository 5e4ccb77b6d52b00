//! End-to-end tests through the full server pipeline.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use psylab::psylab_auth::{Identity, MemoryIdentities};
use psylab::psylab_config::AppConfig;
use psylab::psylab_core::{HttpRequest, HttpResponse, Server, handler};
use psylab::psylab_ratelimit::{
    ConsumeSpec, CounterState, CounterStore, ManualClock, MemoryStore, RateLimitError,
    RateLimitResult,
};
use psylab::psylab_session::Role;
use psylab::{App, CredentialVerifier, Error};
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct OnePassword;

#[async_trait]
impl CredentialVerifier for OnePassword {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<Identity>, Error> {
        Ok((email == "sam@lab.org" && password == "correct horse")
            .then(|| Identity::new("s1", "sam", "sam@lab.org", Role::Subject)))
    }
}

fn config(pairs: &[(&str, &str)]) -> AppConfig {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_vars(&vars).unwrap()
}

fn app(store: Arc<dyn CounterStore>) -> App {
    let identities = Arc::new(MemoryIdentities::new());
    identities.insert(Identity::new("s1", "sam", "sam@lab.org", Role::Subject));
    App::new(config(&[("LIMIT_CONSECUTIVE_ATTEMPTS", "3")]), store)
        .unwrap()
        .with_identities(identities)
        .with_verifier(Arc::new(OnePassword))
}

fn login(password: &str) -> HttpRequest {
    let peer: SocketAddr = "203.0.113.50:51000".parse().unwrap();
    HttpRequest::new("POST", "/api/users/login")
        .with_remote_addr(peer)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"email":"sam@lab.org","password":"{password}"}}"#
        ))
}

fn cookie_pair(res: &HttpResponse) -> String {
    res.header("set-cookie")
        .and_then(|c| c.split(';').next())
        .unwrap()
        .to_string()
}

async fn json(res: HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&res.body.collect().await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_large_json_is_gzip_compressed_end_to_end() {
    let app = app(Arc::new(MemoryStore::new()));
    let rows: Vec<_> = (0..200)
        .map(|i| serde_json::json!({ "stimulus": i, "dimension": "brightness", "rating": i % 7 }))
        .collect();
    let expected = serde_json::Value::Array(rows.clone());
    let server = Server::new(
        app.pipeline().unwrap(),
        handler(move |_req: HttpRequest| {
            let rows = rows.clone();
            async move { Ok(HttpResponse::ok().with_json_value(serde_json::Value::Array(rows))) }
        }),
    );

    let res = server
        .dispatch(
            HttpRequest::new("GET", "/experiments/answers")
                .with_header("accept-encoding", "br;q=0.5, gzip;q=1.0, deflate;q=0.5"),
        )
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-encoding"), Some("gzip"));
    assert!(res.header("content-length").is_none());
    assert!(res.header("vary").unwrap().contains("Accept-Encoding"));
    assert!(res.header("x-response-time").is_some());
    assert_eq!(res.header("x-content-type-options"), Some("nosniff"));

    let compressed = res.body.collect().await.unwrap();
    let mut plain = String::new();
    GzDecoder::new(&compressed[..]).read_to_string(&mut plain).unwrap();
    let decoded: serde_json::Value = serde_json::from_str(&plain).unwrap();
    assert_eq!(decoded, expected);
}

#[tokio::test]
async fn test_identity_refused_is_not_acceptable() {
    let server = app(Arc::new(MemoryStore::new())).server().unwrap();
    let res = server
        .dispatch(HttpRequest::new("GET", "/health").with_header("accept-encoding", "identity;q=0"))
        .await;
    assert_eq!(res.status, 406);
}

#[tokio::test]
async fn test_login_session_round_trip() {
    let server = app(Arc::new(MemoryStore::new())).server().unwrap();

    let res = server.dispatch(login("correct horse")).await;
    assert_eq!(res.status, 200);
    let cookie = cookie_pair(&res);
    assert!(cookie.starts_with("user.sess="));

    let res = server
        .dispatch(HttpRequest::new("GET", "/api/users/profile").with_header("cookie", cookie.clone()))
        .await;
    assert_eq!(res.status, 200);
    let body = json(res).await;
    assert_eq!(body["userData"]["email"], "sam@lab.org");
    assert_eq!(body["userData"]["role"], "subject");

    let res = server
        .dispatch(HttpRequest::new("POST", "/api/users/logout").with_header("cookie", cookie))
        .await;
    assert_eq!(res.status, 200);
    let cleared = cookie_pair(&res);
    assert_eq!(cleared, "user.sess=");

    let res = server
        .dispatch(HttpRequest::new("GET", "/api/users/profile").with_header("cookie", cleared))
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_consecutive_failures_are_rate_limited() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let server = app(Arc::new(MemoryStore::with_clock(clock.clone())))
        .server()
        .unwrap();

    for _ in 0..3 {
        assert_eq!(server.dispatch(login("wrong")).await.status, 401);
    }

    let res = server.dispatch(login("correct horse")).await;
    assert_eq!(res.status, 429);
    let retry: u64 = res.header("retry-after").unwrap().parse().unwrap();
    assert!(retry > 0);

    clock.advance(Duration::from_secs(retry + 1));
    assert_eq!(server.dispatch(login("correct horse")).await.status, 200);
}

struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn get(&self, _key: &str) -> RateLimitResult<Option<CounterState>> {
        Err(RateLimitError::store("connection reset"))
    }

    async fn consume(&self, _key: &str, _spec: ConsumeSpec) -> RateLimitResult<CounterState> {
        Err(RateLimitError::store("connection reset"))
    }

    async fn delete(&self, _key: &str) -> RateLimitResult<bool> {
        Err(RateLimitError::store("connection reset"))
    }

    fn store_type(&self) -> &'static str {
        "unreachable"
    }
}

#[tokio::test]
async fn test_counter_store_failure_is_500() {
    let server = app(Arc::new(UnreachableStore)).server().unwrap();
    let res = server.dispatch(login("correct horse")).await;
    assert_eq!(res.status, 500);

    // Routes without the login guard keep working.
    assert_eq!(server.dispatch(HttpRequest::new("GET", "/health")).await.status, 200);
}

#[derive(Default)]
struct CountingBrokenStore {
    gets: AtomicUsize,
}

#[async_trait]
impl CounterStore for CountingBrokenStore {
    async fn get(&self, _key: &str) -> RateLimitResult<Option<CounterState>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(RateLimitError::store("connection reset"))
    }

    async fn consume(&self, _key: &str, _spec: ConsumeSpec) -> RateLimitResult<CounterState> {
        Err(RateLimitError::store("connection reset"))
    }

    async fn delete(&self, _key: &str) -> RateLimitResult<bool> {
        Err(RateLimitError::store("connection reset"))
    }

    fn store_type(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn test_login_limiter_runs_before_negotiation() {
    let store = Arc::new(CountingBrokenStore::default());
    let server = app(store.clone()).server().unwrap();

    let res = server
        .dispatch(login("correct horse").with_header("accept-encoding", "identity;q=0"))
        .await;

    assert_eq!(res.status, 500);
    assert!(store.gets.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_blocked_login_is_429_even_when_unacceptable() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let server = app(Arc::new(MemoryStore::with_clock(clock)))
        .server()
        .unwrap();
    for _ in 0..3 {
        assert_eq!(server.dispatch(login("wrong")).await.status, 401);
    }

    let res = server
        .dispatch(login("correct horse").with_header("accept-encoding", "identity;q=0"))
        .await;
    assert_eq!(res.status, 429);
    assert!(res.header("retry-after").is_some());

    // Other routes still negotiate.
    let res = server
        .dispatch(HttpRequest::new("GET", "/health").with_header("accept-encoding", "identity;q=0"))
        .await;
    assert_eq!(res.status, 406);
}
