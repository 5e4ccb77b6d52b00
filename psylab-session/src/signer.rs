//! Signed cookie values.
//!
//! Values are stored as `s:<value>.<signature>`, where the signature is the
//! unpadded standard base64 of HMAC-SHA256(secret, value). This matches the
//! convention used by common cookie-parser implementations, so cookies
//! issued by an older deployment stay readable.

use crate::{SessionError, SessionResult};
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Signs and verifies cookie values with a server-held secret.
#[derive(Clone)]
pub struct CookieSigner {
    keyed: HmacSha256,
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    /// Create a signer. An empty secret is rejected.
    pub fn new(secret: impl AsRef<[u8]>) -> SessionResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SessionError::Config(
                "session signing secret must not be empty".to_string(),
            ));
        }
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| SessionError::Config(e.to_string()))?;
        Ok(Self { keyed })
    }

    fn signature(&self, value: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(value.as_bytes());
        STANDARD_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Produce the `s:`-prefixed signed form of `value`.
    pub fn sign(&self, value: &str) -> String {
        format!("{}{}.{}", SIGNED_PREFIX, value, self.signature(value))
    }

    /// Verify a signed value and return the original.
    ///
    /// The comparison runs in constant time.
    pub fn unsign(&self, signed: &str) -> SessionResult<String> {
        let body = signed
            .strip_prefix(SIGNED_PREFIX)
            .ok_or(SessionError::InvalidSignature)?;
        let (value, signature) = body
            .rsplit_once('.')
            .ok_or(SessionError::InvalidSignature)?;
        let signature = STANDARD_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        let mut mac = self.keyed.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        Ok(value.to_string())
    }
}
