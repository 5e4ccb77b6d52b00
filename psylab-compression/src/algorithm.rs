//! Compression algorithm implementations

use crate::{CompressionError, Result};

/// Content codings this crate can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// Gzip compression (widely supported)
    Gzip,

    /// Zlib-wrapped deflate, as HTTP's `deflate` coding expects
    Deflate,

    /// Brotli compression (best ratio for text)
    Brotli,
}

impl CompressionAlgorithm {
    /// All algorithms in the default preference order.
    pub const ALL: [CompressionAlgorithm; 3] = [Self::Brotli, Self::Gzip, Self::Deflate];

    /// Get the Content-Encoding header value for this algorithm
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
        }
    }

    /// Get the minimum compression level for this algorithm
    pub fn min_level(&self) -> u32 {
        0
    }

    /// Get the maximum compression level for this algorithm
    pub fn max_level(&self) -> u32 {
        match self {
            Self::Gzip | Self::Deflate => 9,
            Self::Brotli => 11,
        }
    }

    /// Get the default compression level for this algorithm
    ///
    /// Brotli runs at quality 4 to bound per-request CPU cost.
    pub fn default_level(&self) -> u32 {
        match self {
            Self::Gzip | Self::Deflate => 6,
            Self::Brotli => 4,
        }
    }

    /// Check a level against this algorithm's range
    pub fn validate_level(&self, level: u32) -> Result<u32> {
        if level < self.min_level() || level > self.max_level() {
            return Err(CompressionError::InvalidLevel(
                level,
                self.min_level(),
                self.max_level(),
            ));
        }
        Ok(level)
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encoding_name())
    }
}
