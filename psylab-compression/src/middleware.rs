//! Compression middleware implementation

use crate::{
    CompressedStream, CompressionConfig, CompressionDecision, EncodingNegotiator,
    StreamingCompressor,
};
use async_trait::async_trait;
use http::header::{ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use psylab_core::{Body, Error, HttpRequest, HttpResponse, Middleware, Next};
use regex::Regex;

static NO_TRANSFORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|,)\s*?no-transform\s*?(?:,|$)").expect("no-transform pattern is valid")
});

/// HTTP response compression middleware
///
/// Negotiates a coding from `Accept-Encoding` before the handler runs, so a
/// client that refuses identity and everything we offer gets a 406 without
/// doing any work. Eligible response bodies are then streamed through the
/// chosen encoder.
///
/// # Example
///
/// ```rust
/// use psylab_compression::{CompressionConfig, CompressionMiddleware};
///
/// let config = CompressionConfig::builder()
///     .threshold(2048)
///     .brotli_quality(5)
///     .build()
///     .unwrap();
/// let middleware = CompressionMiddleware::with_config(config);
/// assert_eq!(middleware.config().threshold, 2048);
/// ```
#[derive(Debug, Clone)]
pub struct CompressionMiddleware {
    config: CompressionConfig,
    negotiator: EncodingNegotiator,
}

impl CompressionMiddleware {
    /// Create a new compression middleware with default settings
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create a compression middleware with custom configuration
    pub fn with_config(config: CompressionConfig) -> Self {
        let negotiator = config.negotiator();
        Self { config, negotiator }
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Check if a response should be compressed.
    ///
    /// JSON bodies must already be serialised for the size check to see them.
    fn should_compress(&self, method: &str, response: &HttpResponse) -> bool {
        if method.eq_ignore_ascii_case("HEAD") {
            return false;
        }

        if matches!(response.status, 204 | 205 | 304) || response.body.is_empty() {
            return false;
        }

        if response.headers.contains_key(CONTENT_ENCODING) {
            return false;
        }

        match response.header(CONTENT_TYPE.as_str()) {
            Some(content_type) if self.config.should_compress_content_type(content_type) => {}
            _ => return false,
        }

        if let Some(cache_control) = response.header(CACHE_CONTROL.as_str())
            && NO_TRANSFORM.is_match(cache_control)
        {
            return false;
        }

        let length = response
            .header(CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .or_else(|| response.body.known_len());
        match length {
            Some(length) => self.config.should_compress_size(length),
            // Streams of unknown length are always candidates.
            None => true,
        }
    }
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

/// Add `Accept-Encoding` to `Vary` unless it is already covered.
pub fn append_vary(headers: &mut HeaderMap) {
    let mut covered = false;
    for value in headers.get_all(VARY) {
        let Ok(value) = value.to_str() else { continue };
        if value
            .split(',')
            .map(str::trim)
            .any(|v| v == "*" || v.eq_ignore_ascii_case(ACCEPT_ENCODING.as_str()))
        {
            covered = true;
            break;
        }
    }
    if !covered {
        headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
    }
}

#[async_trait]
impl Middleware for CompressionMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let method = req.method.clone();
        let decision = self.negotiator.negotiate(req.header(ACCEPT_ENCODING.as_str()))?;

        let mut response = next(req).await?;
        append_vary(&mut response.headers);

        let CompressionDecision::Encode(algorithm) = decision else {
            return Ok(response);
        };

        response.body = std::mem::take(&mut response.body)
            .json_to_bytes()
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if !self.should_compress(&method, &response) {
            return Ok(response);
        }

        let compressor = StreamingCompressor::new(algorithm, &self.config)?;
        tracing::debug!(encoding = %algorithm, status = response.status, "Compressing response");

        let source = std::mem::take(&mut response.body).into_stream();
        response.body = Body::from_stream(CompressedStream::new(source, compressor));
        response.headers.remove(CONTENT_LENGTH);
        response.headers.insert(
            CONTENT_ENCODING,
            HeaderValue::from_static(algorithm.encoding_name()),
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_response(body: &str, content_type: &str) -> HttpResponse {
        HttpResponse::new(200)
            .with_header(CONTENT_TYPE, content_type)
            .with_header(CONTENT_LENGTH, body.len().to_string())
            .with_body(body.to_string())
    }

    #[test]
    fn test_should_compress() {
        let middleware = CompressionMiddleware::new();

        let response = create_response(&"x".repeat(2000), "application/json");
        assert!(middleware.should_compress("GET", &response));
        assert!(!middleware.should_compress("HEAD", &response));

        let response = create_response("small", "application/json");
        assert!(!middleware.should_compress("GET", &response));

        let response = create_response(&"x".repeat(2000), "image/png");
        assert!(!middleware.should_compress("GET", &response));

        let mut response = create_response(&"x".repeat(2000), "text/plain");
        response.status = 304;
        assert!(!middleware.should_compress("GET", &response));

        let response = create_response(&"x".repeat(2000), "text/plain")
            .with_header(CACHE_CONTROL, "public, no-transform");
        assert!(!middleware.should_compress("GET", &response));

        let response = create_response(&"x".repeat(2000), "text/plain")
            .with_header(CONTENT_ENCODING, "identity");
        assert!(!middleware.should_compress("GET", &response));

        let response = HttpResponse::ok().with_body("x".repeat(2000));
        assert!(!middleware.should_compress("GET", &response));
    }

    #[test]
    fn test_declared_length_wins_over_body() {
        let middleware = CompressionMiddleware::new();
        let response = HttpResponse::ok()
            .with_header(CONTENT_TYPE, "text/plain")
            .with_header(CONTENT_LENGTH, "500")
            .with_body("x".repeat(2000));
        assert!(!middleware.should_compress("GET", &response));
    }

    #[test]
    fn test_no_transform_pattern() {
        assert!(NO_TRANSFORM.is_match("no-transform"));
        assert!(NO_TRANSFORM.is_match("max-age=0, no-transform"));
        assert!(NO_TRANSFORM.is_match("no-transform , private"));
        assert!(!NO_TRANSFORM.is_match("no-transformer"));
    }

    #[test]
    fn test_vary_appended_once() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        append_vary(&mut headers);
        append_vary(&mut headers);

        let values: Vec<_> = headers.get_all(VARY).iter().collect();
        assert_eq!(values, vec!["Origin", "Accept-Encoding"]);
    }

    #[test]
    fn test_vary_star_is_left_alone() {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("*"));
        append_vary(&mut headers);
        assert_eq!(headers.get_all(VARY).iter().count(), 1);
    }
}
