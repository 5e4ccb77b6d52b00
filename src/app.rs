//! Server assembly.
//!
//! Maps [`AppConfig`] onto each middleware's own config, wires the global
//! pipeline and mounts the user routes.

use async_trait::async_trait;
use psylab_auth::{AuthError, AuthGuard, Identity, IdentityExt, IdentityResolver, MemoryIdentities, TokenService};
use psylab_compression::{
    CompressionAlgorithm, CompressionConfig, CompressionError, CompressionMiddleware,
};
use psylab_config::{AppConfig, CompressionSettings, ConfigError, CorsSettings, SessionSettings};
use psylab_core::logging::{LogConfig, LogOutput};
use psylab_core::{
    CorsMiddleware, Error, HandlerFn, HttpRequest, HttpResponse, MiddlewareChain,
    ResponseTimeConfig, ResponseTimeMiddleware, SecurityHeadersMiddleware, Server, handler,
};
use psylab_ratelimit::{
    BurstBlock, ClientKey, CounterStore, LoginGuard, LoginLimiters, MemoryStore, RateLimitError,
};
use psylab_session::{
    SessionCodec, SessionConfig, SessionData, SessionError, SetSessionExt,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

/// Errors raised while assembling the server.
#[derive(Debug, ThisError)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Server(#[from] Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Checks login credentials against the user store.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// The matching identity, or `Ok(None)` for bad credentials.
    async fn verify(&self, email: &str, password: &str) -> Result<Option<Identity>, Error>;
}

/// Rejects every login. Used until a user store is plugged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

#[async_trait]
impl CredentialVerifier for RejectAll {
    async fn verify(&self, _email: &str, _password: &str) -> Result<Option<Identity>, Error> {
        Ok(None)
    }
}

pub fn compression_config(settings: &CompressionSettings) -> AppResult<CompressionConfig> {
    let mut builder = CompressionConfig::builder()
        .threshold(usize::try_from(settings.threshold).unwrap_or(usize::MAX))
        .gzip_level(settings.gzip_level)
        .deflate_level(settings.deflate_level)
        .brotli_quality(settings.br_quality);
    for (enabled, algorithm) in [
        (settings.br, CompressionAlgorithm::Brotli),
        (settings.gzip, CompressionAlgorithm::Gzip),
        (settings.deflate, CompressionAlgorithm::Deflate),
    ] {
        if !enabled {
            builder = builder.disable(algorithm);
        }
    }
    Ok(builder.build()?)
}

/// The login counter store named by `REDIS_URL`, or process memory when unset.
///
/// A Redis URL in a build without the `redis` feature is a configuration
/// error rather than a silent fallback.
pub async fn counter_store(config: &AppConfig) -> AppResult<Arc<dyn CounterStore>> {
    match config.rate_limit.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = psylab_ratelimit::RedisStore::new(url).await?;
            info!("Login counters stored in Redis");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(ConfigError::ValidationError(
            "REDIS_URL is set but this build lacks the `redis` feature".to_string(),
        )
        .into()),
        None => {
            warn!("REDIS_URL not set; login counters are per-process");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub fn session_config(settings: &SessionSettings) -> SessionConfig {
    SessionConfig::new()
        .with_cookie_name(settings.cookie_name.clone())
        .with_max_age(Duration::from_millis(settings.max_age_ms))
        .with_secure(settings.secure)
}

pub fn cors(settings: &CorsSettings) -> CorsMiddleware {
    CorsMiddleware::new()
        .allow_origin(&settings.origin)
        .allow_methods(settings.methods.clone())
        .allow_headers(settings.headers.clone())
        .allow_credentials(settings.credentials)
        .max_age(settings.max_age_secs)
}

pub fn log_config(config: &AppConfig) -> LogConfig {
    let output = match &config.log.dir {
        Some(dir) => LogOutput::RollingFile {
            directory: dir.clone(),
            prefix: "psylab.log".to_string(),
        },
        None => LogOutput::Stdout,
    };
    LogConfig::new()
        .level(config.log_level())
        .format(config.log.format)
        .output(output)
}

/// Login route, checked by the pipeline's [`LoginGuard`].
pub const LOGIN_PATH: &str = "/api/users/login";

struct Route {
    method: &'static str,
    path: &'static str,
    chain: MiddlewareChain,
    handler: HandlerFn,
}

/// Exact method and path routing, each route with its own middleware.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: &'static str, path: &'static str, handler: HandlerFn) -> Self {
        self.guarded(method, path, MiddlewareChain::new(), handler)
    }

    pub fn guarded(
        mut self,
        method: &'static str,
        path: &'static str,
        chain: MiddlewareChain,
        handler: HandlerFn,
    ) -> Self {
        self.routes.push(Route {
            method,
            path,
            chain,
            handler,
        });
        self
    }

    async fn dispatch(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        let path = match req.path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        let mut path_matched = false;
        for route in self.routes.iter().filter(|r| r.path == path) {
            path_matched = true;
            if route.method.eq_ignore_ascii_case(&req.method) {
                return route.chain.apply(req, route.handler.clone()).await;
            }
        }
        if path_matched {
            Err(Error::MethodNotAllowed(format!("{} {}", req.method, req.path)))
        } else {
            Err(Error::NotFound(req.path))
        }
    }

    pub fn into_handler(self) -> HandlerFn {
        let router = Arc::new(self);
        handler(move |req| {
            let router = router.clone();
            async move { router.dispatch(req).await }
        })
    }
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

/// Everything one server process shares between requests.
#[derive(Clone)]
pub struct App {
    config: AppConfig,
    codec: SessionCodec,
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityResolver>,
    verifier: Arc<dyn CredentialVerifier>,
    limiters: Arc<LoginLimiters>,
}

impl App {
    /// An app with no known users: every login is rejected.
    pub fn new(config: AppConfig, store: Arc<dyn CounterStore>) -> AppResult<Self> {
        let codec = SessionCodec::new(session_config(&config.session), &config.session.secret)?;
        let tokens = TokenService::new(
            &config.auth.jwt_secret,
            Duration::from_secs(config.auth.token_validity_secs),
        )?;
        let limiters = LoginLimiters::with_limits(
            store,
            config.rate_limit.attempts_per_day,
            config.rate_limit.consecutive_attempts,
        )?;
        Ok(Self {
            config,
            codec,
            tokens: Arc::new(tokens),
            identities: Arc::new(MemoryIdentities::new()),
            verifier: Arc::new(RejectAll),
            limiters: Arc::new(limiters),
        })
    }

    pub fn with_identities(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn limiters(&self) -> &Arc<LoginLimiters> {
        &self.limiters
    }

    /// Global middleware, outermost first.
    ///
    /// The login limiter runs ahead of session decoding and compression, so
    /// a blocked or failing login never reaches either.
    pub fn pipeline(&self) -> AppResult<MiddlewareChain> {
        Ok(MiddlewareChain::new()
            .with(ResponseTimeMiddleware::new(ResponseTimeConfig::default()))
            .with(SecurityHeadersMiddleware::new().with_hsts(self.config.server.environment.is_production()))
            .with(cors(&self.config.cors))
            .with(
                LoginGuard::by_identity_and_ip(self.limiters.clone())
                    .with_trust_proxy(self.config.rate_limit.trust_proxy)
                    .only("POST", LOGIN_PATH),
            )
            .with(psylab_session::SessionMiddleware::new(self.codec.clone()))
            .with(CompressionMiddleware::with_config(compression_config(
                &self.config.compression,
            )?)))
    }

    pub fn router(&self) -> Router {
        let trust_proxy = self.config.rate_limit.trust_proxy;
        let authed = MiddlewareChain::new()
            .with(AuthGuard::any(self.tokens.clone(), self.identities.clone()));
        let subject_burst = MiddlewareChain::new()
            .with(AuthGuard::subject(self.tokens.clone(), self.identities.clone()))
            .with(
                BurstBlock::new(Duration::from_millis(self.config.rate_limit.burst_block_ms))
                    .with_trust_proxy(trust_proxy),
            );

        Router::new()
            .route("GET", "/health", health())
            .route("POST", LOGIN_PATH, self.login())
            .route("POST", "/api/users/logout", logout())
            .guarded("GET", "/api/users/profile", authed, profile("Profile fetched successfully"))
            .guarded("GET", "/api/users/homepage", subject_burst, profile("Homepage"))
    }

    pub fn server(&self) -> AppResult<Server> {
        let body_limit = usize::try_from(self.config.server.body_limit).unwrap_or(usize::MAX);
        Ok(Server::new(self.pipeline()?, self.router().into_handler()).with_body_limit(body_limit))
    }

    fn login(&self) -> HandlerFn {
        let verifier = self.verifier.clone();
        let tokens = self.tokens.clone();
        let limiters = self.limiters.clone();
        handler(move |req: HttpRequest| {
            let verifier = verifier.clone();
            let tokens = tokens.clone();
            let limiters = limiters.clone();
            async move {
                let ip = req
                    .extensions
                    .get::<ClientKey>()
                    .map(|key| key.0.clone())
                    .ok_or_else(|| Error::Internal("login route is not guarded".into()))?;
                let credentials: Credentials = req
                    .json()
                    .map_err(|_| Error::BadRequest("email and password are required".into()))?;

                let Some(identity) = verifier
                    .verify(&credentials.email, &credentials.password)
                    .await?
                else {
                    limiters
                        .record_failure(Some(credentials.email.as_str()), &ip)
                        .await?;
                    info!(ip = %ip, "Login failed");
                    return Err(Error::Unauthorized("Invalid credentials".into()));
                };

                limiters.record_success(&credentials.email, &ip).await?;
                let token = tokens.issue(&identity.id).map_err(Error::from)?;
                let mut session = SessionData::new()
                    .with_id(identity.id.clone())
                    .with_role(identity.role)
                    .with_email(identity.email.clone())
                    .with_token(token);
                session.username = Some(identity.username.clone());

                debug!(user = %identity.id, "Login successful");
                Ok(HttpResponse::ok()
                    .with_json_value(json!({ "msg": "Login successful", "userData": identity }))
                    .with_session(Some(session)))
            }
        })
    }
}

fn health() -> HandlerFn {
    handler(|_req: HttpRequest| async { Ok(HttpResponse::ok().with_json_value(json!({ "status": "ok" }))) })
}

fn logout() -> HandlerFn {
    handler(|_req: HttpRequest| async {
        Ok(HttpResponse::ok()
            .with_json_value(json!({ "msg": "Logout successful" }))
            .with_session(None))
    })
}

fn profile(msg: &'static str) -> HandlerFn {
    handler(move |req: HttpRequest| async move {
        let identity = req
            .identity()
            .ok_or_else(|| Error::Unauthorized("User ID not found".into()))?;
        Ok(HttpResponse::ok().with_json_value(json!({ "msg": msg, "userData": identity })))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(&vars).unwrap()
    }

    #[test]
    fn test_compression_mapping() {
        let config = config(&[
            ("COMPRESSION_THRESHOLD", "2kb"),
            ("COMPRESSION_BR", "false"),
            ("COMPRESSION_GZIP_LEVEL", "9"),
        ]);
        let compression = compression_config(&config.compression).unwrap();
        assert_eq!(compression.threshold, 2048);
        assert_eq!(compression.gzip_level, 9);
        assert!(!compression.preferred.contains(&CompressionAlgorithm::Brotli));
    }

    #[test]
    fn test_session_mapping() {
        let config = config(&[("SESSION_COOKIE_NAME", "lab.sess"), ("SESSION_MAX_AGE_MS", "1000")]);
        let session = session_config(&config.session);
        assert_eq!(session.cookie_name, "lab.sess");
        assert_eq!(session.max_age, Duration::from_secs(1));
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_url_without_feature_is_config_error() {
        let with_redis = config(&[("REDIS_URL", "redis://127.0.0.1:6379")]);
        let err = counter_store(&with_redis).await.err().unwrap();
        assert!(matches!(err, AppError::Config(ConfigError::ValidationError(_))));

        let store = counter_store(&config(&[])).await.unwrap();
        assert_eq!(store.store_type(), "memory");
    }

    #[test]
    fn test_body_limit_reaches_server() {
        let store = Arc::new(MemoryStore::new());
        let server = App::new(config(&[("BODY_LIMIT", "2kb")]), store)
            .unwrap()
            .server()
            .unwrap();
        assert_eq!(server.body_limit(), 2048);
    }

    #[tokio::test]
    async fn test_router_not_found_and_method() {
        let router = Router::new().route("GET", "/health", health()).into_handler();

        let res = router(HttpRequest::new("GET", "/health/")).await.unwrap();
        assert_eq!(res.status, 200);

        let err = router(HttpRequest::new("POST", "/health")).await.unwrap_err();
        assert_eq!(err.status_code(), 405);

        let err = router(HttpRequest::new("GET", "/nowhere")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
