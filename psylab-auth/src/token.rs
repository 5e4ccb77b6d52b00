// Auth token issuance and verification

use crate::{AuthError, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Claims carried by an auth token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Identity id
    #[serde(rename = "_id")]
    pub id: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    validity: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a token service
    pub fn new(secret: &str, validity: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(AuthError::Config("token secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            validity,
        })
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token for `id`, valid from now.
    pub fn issue(&self, id: &str) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            id: id.to_string(),
            iat,
            exp: iat + self.validity.as_secs() as i64,
        };
        self.sign(&claims)
    }

    /// Sign explicit claims
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(AuthError::from)
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
