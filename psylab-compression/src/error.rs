//! Error types for compression operations

use thiserror::Error;

/// Errors that can occur during negotiation or compression
#[derive(Error, Debug)]
pub enum CompressionError {
    /// The client excluded identity and named nothing we can produce
    #[error("{0}")]
    NotAcceptable(String),

    /// Compression operation failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Invalid compression level
    #[error("Invalid compression level: {0} (must be between {1} and {2})")]
    InvalidLevel(u32, u32, u32),

    /// Unsupported algorithm
    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// IO error during compression
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CompressionError> for psylab_core::Error {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::NotAcceptable(msg) => psylab_core::Error::NotAcceptable(msg),
            other => psylab_core::Error::Internal(other.to_string()),
        }
    }
}
