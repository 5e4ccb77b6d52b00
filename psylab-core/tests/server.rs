//! The hyper adapter over a real socket.

use psylab_core::{
    Error, HttpRequest, HttpResponse, MiddlewareChain, ResponseTimeConfig, ResponseTimeMiddleware,
    Server, handler,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn roundtrip(raw: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = Server::new(
        MiddlewareChain::new().with(ResponseTimeMiddleware::new(ResponseTimeConfig::default())),
        handler(|req: HttpRequest| async move {
            match req.path.as_str() {
                "/echo" => Ok(HttpResponse::ok().with_text(format!(
                    "{} {}",
                    req.method,
                    String::from_utf8_lossy(&req.body)
                ))),
                _ => Err(Error::NotFound(req.path)),
            }
        }),
    )
    .with_body_limit(16);
    let task = tokio::spawn(server.serve_with_shutdown(listener, async {
        let _ = stopped.await;
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    let _ = stop.send(());
    task.await.unwrap().unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_request_body_reaches_handler() {
    let response = roundtrip(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.to_ascii_lowercase().contains("x-response-time: "));
    assert!(response.ends_with("POST hello"));
}

#[tokio::test]
async fn test_errors_render_as_json_envelope() {
    let response = roundtrip("GET /missing HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(response.contains(r#""status":404"#));
}

#[tokio::test]
async fn test_declared_oversized_body_is_413() {
    let response = roundtrip(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 32\r\nConnection: close\r\n\r\n0123456789abcdef0123456789abcdef",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"));
    assert!(response.contains(r#""status":413"#));
}

#[tokio::test]
async fn test_chunked_body_over_limit_is_413() {
    let response = roundtrip(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n20\r\n0123456789abcdef0123456789abcdef\r\n0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large"));
}

#[tokio::test]
async fn test_body_at_limit_is_accepted() {
    let response = roundtrip(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 16\r\nConnection: close\r\n\r\n0123456789abcdef",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("POST 0123456789abcdef"));
}
