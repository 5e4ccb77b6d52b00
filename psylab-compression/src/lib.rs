//! HTTP response compression for psylab
//!
//! Provides `Accept-Encoding` negotiation and a streaming compression
//! middleware supporting brotli, gzip and deflate.
//!
//! # Example
//!
//! ```rust
//! use psylab_compression::{CompressionAlgorithm, CompressionConfig, CompressionMiddleware};
//!
//! // Defaults: 1 KiB threshold, brotli quality 4, preference br > gzip > deflate
//! let middleware = CompressionMiddleware::new();
//!
//! // Or without brotli
//! let config = CompressionConfig::builder()
//!     .disable(CompressionAlgorithm::Brotli)
//!     .build()
//!     .unwrap();
//! let middleware = CompressionMiddleware::with_config(config);
//! ```
//!
//! # Negotiation
//!
//! The coding with the highest client weight wins; equal weights are
//! resolved by the server preference order. Codings weighted `q=0` are
//! never used. If the client also sets `identity;q=0` and nothing we
//! produce is acceptable, the request fails with 406 Not Acceptable.
//!
//! # What is skipped
//!
//! `HEAD` requests, 204/205/304 responses, bodies that already carry a
//! `Content-Encoding`, `Cache-Control: no-transform`, content types the
//! filter rejects and bodies below the threshold are passed through.
//! `Vary: Accept-Encoding` is added either way.

mod algorithm;
mod config;
mod error;
mod middleware;
mod negotiation;
pub mod streaming;

pub use algorithm::CompressionAlgorithm;
pub use config::{CompressionConfig, CompressionConfigBuilder, ContentTypeFilter, is_compressible};
pub use error::CompressionError;
pub use middleware::{CompressionMiddleware, append_vary};
pub use negotiation::{Coding, CompressionDecision, EncodingNegotiator, EncodingPreferences};
pub use streaming::{CompressedStream, StreamingCompressor};

/// Result type for compression operations
pub type Result<T> = std::result::Result<T, CompressionError>;
