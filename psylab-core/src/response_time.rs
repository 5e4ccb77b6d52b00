//! `X-Response-Time` instrumentation.
//!
//! The middleware measures the time between receiving a request and the
//! response head being produced, renders it through a small template and
//! stamps it on the response. Template tokens: `%method`, `%path`,
//! `%responseTime` and `%suffix`.

use crate::logging::trace;
use crate::middleware::{Middleware, Next};
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_TEMPLATE: &str = "%method - %path: %responseTime%suffix";

/// Timing details handed to the `on_finish` callback.
#[derive(Debug, Clone)]
pub struct ResponseTiming<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub elapsed: Duration,
    /// The elapsed time rendered with the configured precision and unit.
    pub value: &'a str,
}

/// Callback invoked once per request after the header is stamped.
pub type OnFinish = Arc<dyn Fn(&ResponseTiming<'_>) + Send + Sync>;

/// Options for [`ResponseTimeMiddleware`].
#[derive(Clone)]
pub struct ResponseTimeConfig {
    /// Fractional digits in the rendered value.
    pub digits: usize,
    /// Render seconds (`s`) instead of milliseconds (`ms`).
    pub in_seconds: bool,
    pub include_method: bool,
    pub include_path: bool,
    /// Custom template; `None` uses the default layout.
    pub template: Option<String>,
    pub header_name: HeaderName,
    pub on_finish: Option<OnFinish>,
}

impl Default for ResponseTimeConfig {
    fn default() -> Self {
        Self {
            digits: 0,
            in_seconds: false,
            include_method: true,
            include_path: true,
            template: None,
            header_name: HeaderName::from_static("x-response-time"),
            on_finish: None,
        }
    }
}

impl fmt::Debug for ResponseTimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseTimeConfig")
            .field("digits", &self.digits)
            .field("in_seconds", &self.in_seconds)
            .field("include_method", &self.include_method)
            .field("include_path", &self.include_path)
            .field("template", &self.template)
            .field("header_name", &self.header_name)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

impl ResponseTimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    pub fn with_seconds(mut self, enabled: bool) -> Self {
        self.in_seconds = enabled;
        self
    }

    pub fn with_method(mut self, enabled: bool) -> Self {
        self.include_method = enabled;
        self
    }

    pub fn with_path(mut self, enabled: bool) -> Self {
        self.include_path = enabled;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ResponseTiming<'_>) + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(callback));
        self
    }

    fn suffix(&self) -> &'static str {
        if self.in_seconds { "s" } else { "ms" }
    }

    /// Final template with the include flags applied.
    fn resolved_template(&self) -> String {
        let mut template = match &self.template {
            Some(custom) => custom.clone(),
            None => {
                let mut default = DEFAULT_TEMPLATE.to_string();
                if !self.include_method {
                    default = default.replacen("%method - ", "", 1);
                }
                if !self.include_path {
                    default = default.replacen(" - %path", "", 1).replacen("%path: ", "", 1);
                }
                default
            }
        };

        if self.include_method && !template.contains("%method") {
            template = format!("%method - {}", template);
        }
        if self.include_path && !template.contains("%path") {
            template = format!("%path: {}", template);
        }
        template
    }
}

/// Per-request timer. Stamps the header at most once.
#[derive(Debug)]
pub struct ResponseTimer {
    started: Instant,
    stamped: AtomicBool,
}

impl ResponseTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            stamped: AtomicBool::new(false),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns `true` for the first caller only.
    pub fn try_finish(&self) -> bool {
        self.stamped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Middleware adding an `X-Response-Time` header.
#[derive(Debug, Clone)]
pub struct ResponseTimeMiddleware {
    config: ResponseTimeConfig,
    template: String,
}

impl ResponseTimeMiddleware {
    pub fn new(config: ResponseTimeConfig) -> Self {
        let template = config.resolved_template();
        Self { config, template }
    }

    /// Render `elapsed` using the configured unit and precision.
    pub fn format_elapsed(&self, elapsed: Duration) -> String {
        let value = if self.config.in_seconds {
            elapsed.as_secs_f64()
        } else {
            elapsed.as_secs_f64() * 1000.0
        };
        format!("{:.*}", self.config.digits, value)
    }

    /// Render the header value for one request.
    pub fn render(&self, method: &str, path: &str, value: &str) -> String {
        self.template
            .replacen("%method", method, 1)
            .replacen("%path", path, 1)
            .replacen("%responseTime", value, 1)
            .replacen("%suffix", self.config.suffix(), 1)
    }

    fn finish(&self, timer: &ResponseTimer, method: &str, path: &str, response: &mut HttpResponse) {
        if !timer.try_finish() {
            return;
        }

        let elapsed = timer.elapsed();
        let value = self.format_elapsed(elapsed);
        let rendered = self.render(method, path, &value);

        match HeaderValue::from_str(&rendered) {
            Ok(header) => {
                response
                    .headers
                    .insert(self.config.header_name.clone(), header);
            }
            Err(_) => trace!(path = %path, "Response time header not representable"),
        }

        if let Some(callback) = &self.config.on_finish {
            callback(&ResponseTiming {
                method,
                path,
                elapsed,
                value: &value,
            });
        }
    }
}

impl Default for ResponseTimeMiddleware {
    fn default() -> Self {
        Self::new(ResponseTimeConfig::default())
    }
}

#[async_trait]
impl Middleware for ResponseTimeMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let timer = ResponseTimer::start();
        let method = req.method.clone();
        let path = req.path.clone();

        // Errors are rendered here so they carry the header too.
        let mut response = match next(req).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };

        self.finish(&timer, &method, &path, &mut response);
        Ok(response)
    }
}
