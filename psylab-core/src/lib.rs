//! Core HTTP types for the psylab API server.
//!
//! This crate holds the request/response model, the [`Middleware`] trait and
//! [`MiddlewareChain`], cookie helpers, response-time instrumentation and
//! the hyper server adapter. The compression, session, auth and rate-limit
//! crates all plug into the chain defined here.

pub mod body;
pub mod cookie;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod response_time;
pub mod server;

pub use body::{Body, BodyStream};
pub use cookie::{SameSite, SetCookie, parse_cookie_header, request_cookies};
pub use error::Error;
pub use self::http::{HttpRequest, HttpResponse};
pub use middleware::{
    CorsMiddleware, HandlerFn, Middleware, MiddlewareChain, Next, SecurityHeadersMiddleware,
    handler,
};
pub use response_time::{
    ResponseTimeConfig, ResponseTimeMiddleware, ResponseTimer, ResponseTiming,
};
pub use server::{DEFAULT_BODY_LIMIT, Server};

/// Result alias used across the pipeline crates
pub type Result<T> = std::result::Result<T, Error>;
