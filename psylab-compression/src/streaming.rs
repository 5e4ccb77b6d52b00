//! Streaming Compression - Compress chunks as they're produced
//!
//! [`StreamingCompressor`] encodes data incrementally instead of buffering
//! the whole response. [`CompressedStream`] wraps a body stream with one,
//! pulling input only when the consumer asks for output, so a slow client
//! applies backpressure all the way to the producer.
//!
//! # Example
//!
//! ```rust
//! use psylab_compression::{CompressionAlgorithm, CompressionConfig, StreamingCompressor};
//!
//! let config = CompressionConfig::default();
//! let mut compressor = StreamingCompressor::new(CompressionAlgorithm::Gzip, &config).unwrap();
//! let mut out = compressor.compress_chunk(b"hello ").unwrap().to_vec();
//! out.extend_from_slice(&compressor.finish().unwrap());
//! assert!(!out.is_empty());
//! ```

use crate::{CompressionAlgorithm, CompressionConfig, CompressionError, Result};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use futures_util::{Stream, StreamExt};
use psylab_core::BodyStream;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

enum EncoderState {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
    Brotli(Box<brotli::CompressorWriter<Vec<u8>>>),
}

impl EncoderState {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            EncoderState::Gzip(encoder) => encoder,
            EncoderState::Deflate(encoder) => encoder,
            EncoderState::Brotli(encoder) => encoder.as_mut(),
        }
    }

    fn output(&mut self) -> &mut Vec<u8> {
        match self {
            EncoderState::Gzip(encoder) => encoder.get_mut(),
            EncoderState::Deflate(encoder) => encoder.get_mut(),
            EncoderState::Brotli(encoder) => encoder.get_mut(),
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            EncoderState::Gzip(encoder) => encoder.finish(),
            EncoderState::Deflate(encoder) => encoder.finish(),
            // into_inner writes the final brotli block
            EncoderState::Brotli(encoder) => Ok(encoder.into_inner()),
        }
    }
}

/// Streaming compressor that compresses chunks incrementally.
pub struct StreamingCompressor {
    algorithm: CompressionAlgorithm,
    encoder: EncoderState,
    flush_interval: usize,
    unflushed_bytes: usize,
}

impl StreamingCompressor {
    /// Create a compressor for `algorithm` using the levels in `config`.
    pub fn new(algorithm: CompressionAlgorithm, config: &CompressionConfig) -> Result<Self> {
        let level = algorithm.validate_level(config.level_for(algorithm))?;
        let buffer = Vec::with_capacity(config.buffer_size);

        let encoder = match algorithm {
            CompressionAlgorithm::Gzip => {
                EncoderState::Gzip(GzEncoder::new(buffer, Compression::new(level)))
            }
            CompressionAlgorithm::Deflate => {
                EncoderState::Deflate(ZlibEncoder::new(buffer, Compression::new(level)))
            }
            CompressionAlgorithm::Brotli => EncoderState::Brotli(Box::new(
                brotli::CompressorWriter::new(
                    buffer,
                    config.buffer_size,
                    level,
                    config.brotli_window,
                ),
            )),
        };

        Ok(Self {
            algorithm,
            encoder,
            flush_interval: config.flush_interval,
            unflushed_bytes: 0,
        })
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    /// True when input has been written since the last flush.
    pub fn has_pending(&self) -> bool {
        self.unflushed_bytes > 0
    }

    /// Compress a chunk of data.
    ///
    /// Returns compressed bytes. May return empty if data is being buffered.
    pub fn compress_chunk(&mut self, data: &[u8]) -> Result<Bytes> {
        if data.is_empty() {
            return Ok(Bytes::new());
        }

        self.unflushed_bytes += data.len();

        self.encoder
            .writer()
            .write_all(data)
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;

        if self.unflushed_bytes >= self.flush_interval {
            self.flush()
        } else {
            Ok(self.take_output())
        }
    }

    /// Flush compressed data without finishing.
    pub fn flush(&mut self) -> Result<Bytes> {
        self.unflushed_bytes = 0;
        self.encoder
            .writer()
            .flush()
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
        Ok(self.take_output())
    }

    /// Finish compression and return final bytes.
    pub fn finish(self) -> Result<Bytes> {
        let output = self
            .encoder
            .finish()
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;
        Ok(Bytes::from(output))
    }

    fn take_output(&mut self) -> Bytes {
        let inner = self.encoder.output();
        if inner.is_empty() {
            return Bytes::new();
        }
        Bytes::from(std::mem::take(inner))
    }
}

/// A body stream passed through a [`StreamingCompressor`].
///
/// Pending output is flushed whenever the source has nothing ready, so
/// long-lived streams still reach the client promptly. An error from the
/// source or the encoder ends the stream with that error.
pub struct CompressedStream {
    source: BodyStream,
    compressor: Option<StreamingCompressor>,
}

impl CompressedStream {
    pub fn new(source: BodyStream, compressor: StreamingCompressor) -> Self {
        Self {
            source,
            compressor: Some(compressor),
        }
    }
}

impl Stream for CompressedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(compressor) = this.compressor.as_mut() else {
                return Poll::Ready(None);
            };

            match this.source.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => match compressor.compress_chunk(&chunk) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => return Poll::Ready(Some(Ok(out))),
                    Err(e) => {
                        this.compressor = None;
                        return Poll::Ready(Some(Err(io::Error::other(e))));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Body stream failed during compression");
                    this.compressor = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    let Some(compressor) = this.compressor.take() else {
                        return Poll::Ready(None);
                    };
                    let algorithm = compressor.algorithm();
                    return match compressor.finish() {
                        Ok(out) if out.is_empty() => Poll::Ready(None),
                        Ok(out) => Poll::Ready(Some(Ok(out))),
                        Err(e) => {
                            tracing::warn!(%algorithm, error = %e, "Failed to finish compression");
                            Poll::Ready(Some(Err(io::Error::other(e))))
                        }
                    };
                }
                Poll::Pending => {
                    if compressor.has_pending() {
                        match compressor.flush() {
                            Ok(out) if !out.is_empty() => return Poll::Ready(Some(Ok(out))),
                            Ok(_) => {}
                            Err(e) => {
                                this.compressor = None;
                                return Poll::Ready(Some(Err(io::Error::other(e))));
                            }
                        }
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use futures_util::stream;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_streaming() {
        let config = CompressionConfig::builder()
            .flush_interval(10)
            .build()
            .unwrap();
        let mut compressor = StreamingCompressor::new(CompressionAlgorithm::Gzip, &config).unwrap();

        let mut total = BytesMut::new();
        for _ in 0..10 {
            let data = b"Hello, World! This is a test chunk.\n";
            total.extend_from_slice(&compressor.compress_chunk(data).unwrap());
        }

        total.extend_from_slice(&compressor.finish().unwrap());
        assert_eq!(
            gunzip(&total),
            b"Hello, World! This is a test chunk.\n".repeat(10)
        );
    }

    #[test]
    fn test_brotli_streaming() {
        let config = CompressionConfig::default();
        let mut compressor =
            StreamingCompressor::new(CompressionAlgorithm::Brotli, &config).unwrap();

        let mut total = BytesMut::new();
        total.extend_from_slice(&compressor.compress_chunk(&b"trial ".repeat(500)).unwrap());
        total.extend_from_slice(&compressor.finish().unwrap());

        let mut out = Vec::new();
        brotli::BrotliDecompress(&mut &total[..], &mut out).unwrap();
        assert_eq!(out, b"trial ".repeat(500));
    }

    #[tokio::test]
    async fn test_compressed_stream_round_trip() {
        let config = CompressionConfig::default();
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk, ")),
            Ok(Bytes::from_static(b"second chunk")),
        ])
        .boxed();
        let compressor = StreamingCompressor::new(CompressionAlgorithm::Gzip, &config).unwrap();

        let chunks: Vec<_> = CompressedStream::new(source, compressor).collect().await;
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(gunzip(&body), b"first chunk, second chunk");
    }

    #[tokio::test]
    async fn test_compressed_stream_propagates_source_error() {
        let config = CompressionConfig::default();
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("producer failed")),
            Ok(Bytes::from_static(b"never sent")),
        ])
        .boxed();
        let compressor = StreamingCompressor::new(CompressionAlgorithm::Deflate, &config).unwrap();

        let items: Vec<_> = CompressedStream::new(source, compressor).collect().await;
        let last = items.last().unwrap();
        assert_eq!(last.as_ref().unwrap_err().to_string(), "producer failed");
    }
}
