//! Response bodies.
//!
//! A body is either fully buffered, a JSON value that has not been
//! serialised yet, or a stream of byte chunks. Streams carry `io::Error`
//! so a failing producer (for example a compressor) can abort the
//! response instead of ending it silently.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;

/// Boxed stream of body chunks.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// Outbound response body.
#[derive(Default)]
pub enum Body {
    /// No body at all.
    #[default]
    Empty,
    /// Fully buffered bytes.
    Bytes(Bytes),
    /// A JSON document, serialised on the way out.
    Json(serde_json::Value),
    /// A chunked stream of unknown length.
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    /// True when the body is known to carry no bytes.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Json(_) | Body::Stream(_) => false,
        }
    }

    /// Length in bytes when known without consuming the body.
    pub fn known_len(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len()),
            Body::Json(_) | Body::Stream(_) => None,
        }
    }

    /// Serialise a JSON body into bytes; other variants are returned as is.
    pub fn json_to_bytes(self) -> Result<Body, serde_json::Error> {
        match self {
            Body::Json(value) => Ok(Body::Bytes(Bytes::from(serde_json::to_vec(&value)?))),
            other => Ok(other),
        }
    }

    /// Turn any body into a chunk stream.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Empty => stream::empty().boxed(),
            Body::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Body::Json(value) => {
                let chunk = serde_json::to_vec(&value)
                    .map(Bytes::from)
                    .map_err(io::Error::other);
                stream::once(async move { chunk }).boxed()
            }
            Body::Stream(stream) => stream,
        }
    }

    /// Buffer the whole body.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bytes) => Ok(bytes),
            other => {
                let mut stream = other.into_stream();
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Body::Json(value) => f.debug_tuple("Body::Json").field(value).finish(),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(text.as_bytes()))
    }
}
