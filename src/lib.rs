//! psylab - API server core for perceptual psychology experiments.
//!
//! The member crates each provide one piece of the request pipeline:
//!
//! - [`psylab_core`]: request/response model, middleware chain, hyper server
//! - [`psylab_config`]: environment-driven settings
//! - [`psylab_compression`]: `Accept-Encoding` negotiation and streaming compression
//! - [`psylab_session`]: HMAC-signed cookie sessions
//! - [`psylab_auth`]: JWT tokens and role guards
//! - [`psylab_ratelimit`]: login attempt limiting
//!
//! [`app`] assembles them into a server.

pub mod app;

pub use psylab_auth;
pub use psylab_compression;
pub use psylab_config;
pub use psylab_core;
pub use psylab_ratelimit;
pub use psylab_session;

pub use app::{App, AppError, AppResult, CredentialVerifier, RejectAll, Router};
pub use psylab_core::{Error, HttpRequest, HttpResponse, Middleware, MiddlewareChain};
