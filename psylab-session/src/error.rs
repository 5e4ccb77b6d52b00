//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
///
/// Decoding never surfaces these to a request: a bad cookie becomes an
/// empty session. They are returned by the lower-level codec calls.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The cookie value is not signed, or the signature does not match
    #[error("Invalid session signature")]
    InvalidSignature,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SessionError> for psylab_core::Error {
    fn from(err: SessionError) -> Self {
        psylab_core::Error::Internal(err.to_string())
    }
}
