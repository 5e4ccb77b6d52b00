//! Session cookie encoding and decoding.

use crate::{CookieSigner, SessionData, SessionError, SessionResult};
use http::HeaderMap;
use psylab_core::cookie::{SameSite, SetCookie, request_cookies};
use std::time::Duration;

/// Session cookie configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie name
    pub cookie_name: String,
    /// Cookie lifetime
    pub max_age: Duration,
    /// Mark the cookie `HttpOnly`
    pub http_only: bool,
    /// Mark the cookie `Secure` (enable in production)
    pub secure: bool,
    /// `SameSite` policy
    pub same_site: SameSite,
    /// Cookie path
    pub path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "user.sess".to_string(),
            max_age: Duration::from_millis(86_400_000),
            http_only: true,
            secure: false,
            same_site: SameSite::Strict,
            path: "/".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Turns request cookies into a [`SessionData`] and back.
#[derive(Debug, Clone)]
pub struct SessionCodec {
    config: SessionConfig,
    signer: CookieSigner,
}

impl SessionCodec {
    pub fn new(config: SessionConfig, secret: impl AsRef<[u8]>) -> SessionResult<Self> {
        Ok(Self {
            config,
            signer: CookieSigner::new(secret)?,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read the session from request headers.
    ///
    /// A missing cookie yields an empty session silently. A cookie that
    /// fails verification or parsing also yields an empty session, with a
    /// warning; it is never an error for the request.
    pub fn decode(&self, headers: &HeaderMap) -> SessionData {
        let cookies = request_cookies(headers);
        let Some(raw) = cookies.get(&self.config.cookie_name) else {
            return SessionData::default();
        };

        match self.decode_value(raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(cookie = %self.config.cookie_name, error = %e, "Discarding session cookie");
                SessionData::default()
            }
        }
    }

    /// Verify and parse one signed cookie value.
    pub fn decode_value(&self, raw: &str) -> SessionResult<SessionData> {
        let json = self.signer.unsign(raw)?;
        serde_json::from_str(&json).map_err(|e| SessionError::Deserialization(e.to_string()))
    }

    /// Sign a session into a cookie value (before URL encoding).
    pub fn encode_value(&self, data: &SessionData) -> SessionResult<String> {
        let json =
            serde_json::to_string(data).map_err(|e| SessionError::Serialization(e.to_string()))?;
        Ok(self.signer.sign(&json))
    }

    /// Build the `Set-Cookie` for a replacement payload.
    ///
    /// `None` or an empty payload clears the cookie rather than signing an
    /// empty value.
    pub fn encode(&self, data: Option<&SessionData>) -> SessionResult<SetCookie> {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => return Ok(SetCookie::clear(&self.config.cookie_name).path(&self.config.path)),
        };

        Ok(
            SetCookie::new(&self.config.cookie_name, self.encode_value(data)?)
                .path(&self.config.path)
                .max_age(self.config.max_age)
                .http_only(self.config.http_only)
                .secure(self.config.secure)
                .same_site(self.config.same_site),
        )
    }
}
