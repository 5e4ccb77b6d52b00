//! Configuration for compression middleware

use crate::{CompressionAlgorithm, EncodingNegotiator, Result};
use std::fmt;
use std::sync::Arc;

/// Predicate over a response's `Content-Type` value.
pub type ContentTypeFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Configuration for the compression middleware
#[derive(Clone)]
pub struct CompressionConfig {
    /// Minimum response size in bytes to compress (default: 1024).
    /// Zero compresses every eligible response.
    pub threshold: usize,

    /// Decides whether a content type is worth compressing
    pub filter: ContentTypeFilter,

    /// Server preference order used to break ties between equal weights
    pub preferred: Vec<CompressionAlgorithm>,

    /// Gzip level (0-9)
    pub gzip_level: u32,

    /// Deflate level (0-9)
    pub deflate_level: u32,

    /// Brotli quality (0-11)
    pub brotli_quality: u32,

    /// Brotli window size, log2
    pub brotli_window: u32,

    /// Encoder buffer size
    pub buffer_size: usize,

    /// Flush the encoder once this many input bytes are pending
    pub flush_interval: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: 1024,
            filter: Arc::new(is_compressible),
            preferred: CompressionAlgorithm::ALL.to_vec(),
            gzip_level: CompressionAlgorithm::Gzip.default_level(),
            deflate_level: CompressionAlgorithm::Deflate.default_level(),
            brotli_quality: CompressionAlgorithm::Brotli.default_level(),
            brotli_window: 22,
            buffer_size: 8192,
            flush_interval: 16 * 1024,
        }
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("threshold", &self.threshold)
            .field("preferred", &self.preferred)
            .field("gzip_level", &self.gzip_level)
            .field("deflate_level", &self.deflate_level)
            .field("brotli_quality", &self.brotli_quality)
            .field("brotli_window", &self.brotli_window)
            .field("buffer_size", &self.buffer_size)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

impl CompressionConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for configuration
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder::new()
    }

    /// Level used for `algorithm`
    pub fn level_for(&self, algorithm: CompressionAlgorithm) -> u32 {
        match algorithm {
            CompressionAlgorithm::Gzip => self.gzip_level,
            CompressionAlgorithm::Deflate => self.deflate_level,
            CompressionAlgorithm::Brotli => self.brotli_quality,
        }
    }

    /// Check every configured level against its algorithm's range
    pub fn validate(&self) -> Result<()> {
        for algorithm in CompressionAlgorithm::ALL {
            algorithm.validate_level(self.level_for(algorithm))?;
        }
        Ok(())
    }

    /// Negotiator honouring the configured preference order
    pub fn negotiator(&self) -> EncodingNegotiator {
        EncodingNegotiator::new(self.preferred.clone())
    }

    /// Check if a content type should be compressed
    pub fn should_compress_content_type(&self, content_type: &str) -> bool {
        (self.filter)(content_type)
    }

    /// Check if a response should be compressed based on size
    pub fn should_compress_size(&self, size: usize) -> bool {
        size >= self.threshold
    }
}

/// Builder for CompressionConfig
#[derive(Debug, Clone, Default)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: CompressionConfig::default(),
        }
    }

    /// Set the minimum response size to compress
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Replace the content-type predicate
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.config.filter = Arc::new(filter);
        self
    }

    /// Set the server preference order
    pub fn preferred(mut self, preferred: Vec<CompressionAlgorithm>) -> Self {
        self.config.preferred = preferred;
        self
    }

    /// Remove an algorithm from the preference order
    pub fn disable(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.config.preferred.retain(|a| *a != algorithm);
        self
    }

    /// Set the gzip level
    pub fn gzip_level(mut self, level: u32) -> Self {
        self.config.gzip_level = level;
        self
    }

    /// Set the deflate level
    pub fn deflate_level(mut self, level: u32) -> Self {
        self.config.deflate_level = level;
        self
    }

    /// Set the brotli quality
    pub fn brotli_quality(mut self, quality: u32) -> Self {
        self.config.brotli_quality = quality;
        self
    }

    /// Set the flush interval (bytes)
    pub fn flush_interval(mut self, interval: usize) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the encoder buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Build the configuration, rejecting out-of-range levels
    pub fn build(self) -> Result<CompressionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Default content-type predicate.
///
/// Matches `text/*`, the usual structured text types and any
/// `+json`, `+xml` or `+text` suffix type.
pub fn is_compressible(content_type: &str) -> bool {
    let ct_lower = content_type.to_ascii_lowercase();
    let ct_base = ct_lower.split(';').next().unwrap_or("").trim();

    if ct_base.starts_with("text/") {
        return true;
    }
    if ct_base.ends_with("+json") || ct_base.ends_with("+xml") || ct_base.ends_with("+text") {
        return true;
    }

    matches!(
        ct_base,
        "application/json"
            | "application/javascript"
            | "application/x-javascript"
            | "application/xml"
            | "application/wasm"
            | "application/vnd.ms-fontobject"
            | "image/svg+xml"
            | "font/ttf"
            | "font/otf"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompressionConfig::default();
        assert_eq!(config.threshold, 1024);
        assert_eq!(config.brotli_quality, 4);
        assert_eq!(config.preferred, CompressionAlgorithm::ALL.to_vec());
    }

    #[test]
    fn test_builder() {
        let config = CompressionConfig::builder()
            .threshold(0)
            .gzip_level(9)
            .disable(CompressionAlgorithm::Brotli)
            .build()
            .unwrap();

        assert_eq!(config.threshold, 0);
        assert_eq!(config.level_for(CompressionAlgorithm::Gzip), 9);
        assert_eq!(
            config.preferred,
            vec![CompressionAlgorithm::Gzip, CompressionAlgorithm::Deflate]
        );
    }

    #[test]
    fn test_builder_rejects_bad_level() {
        assert!(CompressionConfig::builder().brotli_quality(12).build().is_err());
        assert!(CompressionConfig::builder().deflate_level(10).build().is_err());
    }

    #[test]
    fn test_should_compress_content_type() {
        let config = CompressionConfig::default();

        assert!(config.should_compress_content_type("text/html"));
        assert!(config.should_compress_content_type("text/plain; charset=utf-8"));
        assert!(config.should_compress_content_type("application/json; charset=utf-8"));
        assert!(config.should_compress_content_type("application/problem+json"));
        assert!(config.should_compress_content_type("image/svg+xml"));

        assert!(!config.should_compress_content_type("image/png"));
        assert!(!config.should_compress_content_type("video/mp4"));
        assert!(!config.should_compress_content_type("application/octet-stream"));
    }

    #[test]
    fn test_custom_filter() {
        let config = CompressionConfig::builder()
            .filter(|ct| ct.starts_with("application/octet-stream"))
            .build()
            .unwrap();
        assert!(config.should_compress_content_type("application/octet-stream"));
        assert!(!config.should_compress_content_type("text/html"));
    }

    #[test]
    fn test_should_compress_size() {
        let config = CompressionConfig::builder().threshold(1024).build().unwrap();

        assert!(!config.should_compress_size(500));
        assert!(!config.should_compress_size(1023));
        assert!(config.should_compress_size(1024));
    }
}
