// hyper adapter: accepts connections and drives the middleware chain

use crate::logging::{debug, error, info, warn};
use crate::middleware::{HandlerFn, MiddlewareChain};
use crate::{Body, Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Body type handed to hyper.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Request bodies larger than this are refused with 413 (100 KiB).
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// An HTTP/1 server running one middleware chain in front of one handler.
#[derive(Clone)]
pub struct Server {
    chain: MiddlewareChain,
    handler: HandlerFn,
    body_limit: usize,
}

impl Server {
    pub fn new(chain: MiddlewareChain, handler: HandlerFn) -> Self {
        Self {
            chain,
            handler,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Largest request body read before answering 413.
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Run one request through the chain, rendering escaped errors.
    pub async fn dispatch(&self, req: HttpRequest) -> HttpResponse {
        let method = req.method.clone();
        let path = req.path.clone();

        match self.chain.apply(req, self.handler.clone()).await {
            Ok(response) => {
                debug!(method = %method, path = %path, status = response.status, "Request complete");
                response
            }
            Err(err) => {
                if err.is_server_error() {
                    error!(method = %method, path = %path, error = %err, "Request failed");
                } else {
                    debug!(method = %method, path = %path, error = %err, "Request rejected");
                }
                err.into_response()
            }
        }
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn listen(self, addr: SocketAddr) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Accept connections from `listener` until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(address = %local, "Server listening");
        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            let (stream, remote) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let server = server.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = server.clone();
                    async move { handle_request(req, remote, server).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(remote = %remote, error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Handle an incoming HTTP request
async fn handle_request(
    req: Request<Incoming>,
    remote: SocketAddr,
    server: Arc<Server>,
) -> Result<Response<ResponseBody>, hyper::Error> {
    let (parts, body) = req.into_parts();

    let mut request = HttpRequest::new(parts.method.as_str(), parts.uri.path());
    request.query_params = parse_query(parts.uri.query());
    request.headers = parts.headers;
    request.remote_addr = Some(remote);

    let limit = server.body_limit;
    let declared = request
        .headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Ok(payload_too_large(&request, limit));
    }

    request.body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            return Ok(payload_too_large(&request, limit));
        }
        Err(err) => {
            return match err.downcast::<hyper::Error>() {
                Ok(err) => Err(*err),
                Err(err) => Ok(into_hyper_response(
                    Error::BadRequest(err.to_string()).into_response(),
                )),
            };
        }
    };

    let response = server.dispatch(request).await;
    Ok(into_hyper_response(response))
}

fn payload_too_large(request: &HttpRequest, limit: usize) -> Response<ResponseBody> {
    debug!(method = %request.method, path = %request.path, limit, "Request body too large");
    into_hyper_response(
        Error::PayloadTooLarge(format!("request body exceeds {limit} bytes")).into_response(),
    )
}

/// Convert our response into a hyper response.
///
/// Stream errors propagate to hyper, which aborts the connection so the
/// client sees a truncated transfer rather than a clean end of body.
pub fn into_hyper_response(response: HttpResponse) -> Response<ResponseBody> {
    let body: ResponseBody = match response.body {
        Body::Empty => Empty::new().map_err(|never| match never {}).boxed_unsync(),
        Body::Bytes(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
        Body::Json(value) => match serde_json::to_vec(&value) {
            Ok(bytes) => Full::new(Bytes::from(bytes))
                .map_err(|never| match never {})
                .boxed_unsync(),
            Err(err) => {
                error!(error = %err, "Failed to serialise JSON response body");
                return into_hyper_response(
                    Error::Serialization(err.to_string()).into_response(),
                );
            }
        },
        Body::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
    };

    let mut hyper_response = Response::new(body);
    *hyper_response.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *hyper_response.headers_mut() = response.headers;
    hyper_response
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        params.entry(key).or_insert(value);
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|v| v.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler;
    use futures_util::stream;

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("page=2&q=red+dots&q=ignored&flag&name=a%20b"));
        assert_eq!(params["page"], "2");
        assert_eq!(params["q"], "red dots");
        assert_eq!(params["flag"], "");
        assert_eq!(params["name"], "a b");
        assert!(parse_query(None).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_renders_errors() {
        let server = Server::new(
            MiddlewareChain::new(),
            handler(|_req| async { Err(Error::NotFound("API Endpoint Not Found: /nope".into())) }),
        );
        let response = server.dispatch(HttpRequest::new("GET", "/nope")).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_stream_error_reaches_hyper_body() {
        let chunks = vec![Ok(Bytes::from("abc")), Err(io::Error::other("compressor failed"))];
        let response = HttpResponse::ok().with_body(Body::from_stream(stream::iter(chunks)));
        let hyper_response = into_hyper_response(response);
        assert!(hyper_response.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(
            MiddlewareChain::new(),
            handler(|req| async move {
                let peer = req.remote_addr.map(|a| a.ip().to_string()).unwrap_or_default();
                Ok(HttpResponse::ok().with_text(peer))
            }),
        );
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(listener, async {
            let _ = stopped.await;
        }));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let request = Request::builder()
            .uri("/health")
            .header("host", "localhost")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("127.0.0.1"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
