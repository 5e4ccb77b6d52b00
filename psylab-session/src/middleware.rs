//! Session middleware and request/response accessors.

use crate::{SessionCodec, SessionData};
use async_trait::async_trait;
use http::HeaderValue;
use http::header::SET_COOKIE;
use psylab_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use std::sync::Arc;

/// Replacement payload a handler attaches to its response.
///
/// `None` clears the cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate(pub Option<SessionData>);

/// Access to the decoded session on a request.
pub trait SessionExt {
    /// The decoded session, if [`SessionMiddleware`] ran.
    fn session(&self) -> Option<&SessionData>;

    /// Mutable access for inner middleware (for example auth refreshing identity).
    fn session_mut(&mut self) -> Option<&mut SessionData>;
}

impl SessionExt for HttpRequest {
    fn session(&self) -> Option<&SessionData> {
        self.extensions.get::<SessionData>()
    }

    fn session_mut(&mut self) -> Option<&mut SessionData> {
        self.extensions.get_mut::<SessionData>()
    }
}

/// Replace the session from a handler's response.
pub trait SetSessionExt: Sized {
    fn set_session(&mut self, data: Option<SessionData>);

    fn with_session(mut self, data: Option<SessionData>) -> Self {
        self.set_session(data);
        self
    }
}

impl SetSessionExt for HttpResponse {
    fn set_session(&mut self, data: Option<SessionData>) {
        self.extensions.insert(SessionUpdate(data));
    }
}

/// Decodes the session cookie on the way in and writes any
/// [`SessionUpdate`] back as `Set-Cookie` on the way out.
#[derive(Debug, Clone)]
pub struct SessionMiddleware {
    codec: Arc<SessionCodec>,
}

impl SessionMiddleware {
    pub fn new(codec: SessionCodec) -> Self {
        Self {
            codec: Arc::new(codec),
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let session = self.codec.decode(&req.headers);
        tracing::trace!(authenticated = session.token.is_some(), "Session decoded");
        req.extensions.insert(session);

        let mut res = next(req).await?;

        if let Some(SessionUpdate(update)) = res.extensions.remove::<SessionUpdate>() {
            let cookie = self.codec.encode(update.as_ref())?;
            let value = HeaderValue::from_str(&cookie.to_header_value())
                .map_err(|e| Error::Internal(format!("Invalid session cookie: {}", e)))?;
            res.headers.append(SET_COOKIE, value);
        }

        Ok(res)
    }
}
