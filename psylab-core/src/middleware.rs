// Middleware system for request/response processing

use crate::logging::{debug, trace};
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use http::HeaderValue;
use http::header;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<
    dyn FnOnce(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send,
>;

/// Type alias for handler functions
pub type HandlerFn = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async function as a [`HandlerFn`].
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

#[async_trait]
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        (**self).handle(req, next).await
    }
}

/// Middleware chain executor.
///
/// The first middleware registered is the outermost: it sees the request
/// first and the response last.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    /// Builder form of [`use_middleware`](Self::use_middleware).
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.use_middleware(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        handler: HandlerFn,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>> {
        if index >= self.middlewares.len() {
            // No more middleware, call the handler
            trace!("Middleware chain complete, calling handler");
            handler(req)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();
            let handler_clone = handler.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, handler_clone)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Middleware ==========

/// CORS (Cross-Origin Resource Sharing) middleware
pub struct CorsMiddleware {
    pub allow_origin: String,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: u64,
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allow_headers: ["Content-Type", "Authorization", "Origin", "Accept"]
                .map(String::from)
                .to_vec(),
            allow_credentials: true,
            max_age: 31_536_000,
        }
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.allow_origin = origin.to_string();
        self
    }

    pub fn allow_methods(mut self, methods: Vec<String>) -> Self {
        self.allow_methods = methods;
        self
    }

    pub fn allow_headers(mut self, headers: Vec<String>) -> Self {
        self.allow_headers = headers;
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = secs;
        self
    }

    fn decorate(&self, response: &mut HttpResponse) {
        if let Ok(origin) = HeaderValue::from_str(&self.allow_origin) {
            response
                .headers
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        if self.allow_origin != "*" {
            response
                .headers
                .append(header::VARY, HeaderValue::from_static("Origin"));
        }
        if self.allow_credentials {
            response.headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        // Handle preflight requests
        if req.method == "OPTIONS" {
            let mut response = HttpResponse::ok()
                .with_header(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    self.allow_methods.join(","),
                )
                .with_header(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    self.allow_headers.join(","),
                )
                .with_header(header::ACCESS_CONTROL_MAX_AGE, self.max_age.to_string())
                .with_header(header::CONTENT_LENGTH, "0");
            self.decorate(&mut response);
            return Ok(response);
        }

        // Process request and add CORS headers to response
        let mut response = next(req).await?;
        self.decorate(&mut response);
        Ok(response)
    }
}

/// Security headers middleware.
///
/// Defaults: a same-origin content security policy, `SAMEORIGIN` framing,
/// one year of HSTS including subdomains, no referrer, DNS prefetching off,
/// and no `X-Powered-By`.
pub struct SecurityHeadersMiddleware {
    content_security_policy: Option<String>,
    hsts_enabled: bool,
    frame_options: Option<String>,
    referrer_policy: String,
}

impl SecurityHeadersMiddleware {
    pub fn new() -> Self {
        Self {
            content_security_policy: Some(
                [
                    "default-src 'self'",
                    "script-src 'self'",
                    "style-src 'self' 'unsafe-inline'",
                    "img-src 'self' data: blob:",
                    "media-src 'self' data: blob:",
                    "font-src 'self' data:",
                    "base-uri 'self'",
                    "form-action 'self'",
                    "frame-ancestors 'self'",
                    "object-src 'none'",
                    "script-src-attr 'none'",
                    "upgrade-insecure-requests",
                ]
                .join(";"),
            ),
            hsts_enabled: true,
            frame_options: Some("SAMEORIGIN".to_string()),
            referrer_policy: "no-referrer".to_string(),
        }
    }

    pub fn with_hsts(mut self, enabled: bool) -> Self {
        self.hsts_enabled = enabled;
        self
    }

    pub fn with_frame_options(mut self, value: &str) -> Self {
        self.frame_options = Some(value.to_string());
        self
    }

    pub fn with_content_security_policy(mut self, policy: Option<String>) -> Self {
        self.content_security_policy = policy;
        self
    }
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for SecurityHeadersMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let mut response = next(req).await?;
        let headers = &mut response.headers;

        if let Some(Ok(csp)) = self
            .content_security_policy
            .as_deref()
            .map(HeaderValue::from_str)
        {
            headers.insert(header::CONTENT_SECURITY_POLICY, csp);
        }

        if self.hsts_enabled {
            headers.insert(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            );
        }

        if let Some(Ok(frame_opts)) = self.frame_options.as_deref().map(HeaderValue::from_str) {
            headers.insert(header::X_FRAME_OPTIONS, frame_opts);
        }

        if let Ok(policy) = HeaderValue::from_str(&self.referrer_policy) {
            headers.insert(header::REFERRER_POLICY, policy);
        }

        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
        headers.insert(
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        );
        headers.remove("x-powered-by");

        Ok(response)
    }
}
