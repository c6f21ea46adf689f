#![allow(clippy::unwrap_used)]
// Integration tests for `HttpTransport` failure kinds against real sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rainfly_api::{
    Client, ClientConfig, Error, HttpTransport, Method, RawRequest, Transport, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn transport() -> HttpTransport {
    HttpTransport::new(&TransportConfig::default()).unwrap()
}

fn get(url: &str, timeout: Duration) -> RawRequest {
    RawRequest::new(Method::Get, Url::parse(url).unwrap(), timeout)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

/// Read one request (head and body) and return its path without query.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let total = head_end + 4 + content_length(&head);
    while buf.len() < total {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    target.split('?').next().unwrap_or(target).to_owned()
}

async fn respond_json(stream: &mut TcpStream, body: &serde_json::Value) {
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    let _ = stream.shutdown().await;
}

// ── Failure kinds ───────────────────────────────────────────────────

#[tokio::test]
async fn test_slow_response_is_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/4/zone"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "zones": [] }))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let url = format!("{}/api/4/zone", server.uri());
    let result = transport()
        .send(get(&url, Duration::from_millis(100)))
        .await;

    match result {
        Err(Error::Timeout { url: failed, timeout }) => {
            assert_eq!(failed, url);
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected Timeout, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_closed_after_request_is_peer_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        drop(stream);
    });

    let url = format!("http://{addr}/api/4/zone");
    let result = transport().send(get(&url, Duration::from_secs(5))).await;

    assert!(
        matches!(result, Err(Error::PeerDisconnected { .. })),
        "expected PeerDisconnected, got: {result:?}"
    );
}

#[tokio::test]
async fn test_nothing_listening_is_connectivity() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/api/4/zone");
    let result = transport().send(get(&url, Duration::from_secs(5))).await;

    assert!(
        matches!(result, Err(Error::Connectivity { .. })),
        "expected Connectivity, got: {result:?}"
    );
}

// ── Retry through the client ────────────────────────────────────────

#[tokio::test]
async fn test_dropped_connection_is_retried_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let zone_connections = Arc::new(AtomicUsize::new(0));

    let (seen, zone_seen) = (Arc::clone(&connections), Arc::clone(&zone_connections));
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            seen.fetch_add(1, Ordering::SeqCst);
            let body = match read_request(&mut stream).await.as_str() {
                "/api/4/auth/login" => json!({ "access_token": "12345abcde", "expires_in": 3600 }),
                "/api/4/provision/wifi" => json!({ "macAddress": "ab:cd:ef:12:34:56" }),
                "/api/4/provision/name" => json!({ "name": "My House" }),
                "/api/4/apiVer" => json!({ "apiVer": "4.5.0", "hwVer": 3, "swVer": "4.0.925" }),
                "/api/4/zone" => {
                    if zone_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        drop(stream);
                        continue;
                    }
                    json!({ "zones": [{ "uid": 1, "name": "Landscaping" }] })
                }
                _ => json!({}),
            };
            respond_json(&mut stream, &body).await;
        }
    });

    let client = Client::new(ClientConfig::default()).unwrap();
    let controller = client
        .load_local(
            &addr.ip().to_string(),
            &"my_password".to_string().into(),
            addr.port(),
            false,
        )
        .await
        .unwrap();

    let zones = controller.zones().all(false, true).await.unwrap();

    assert_eq!(zones.len(), 1);
    assert_eq!(zone_connections.load(Ordering::SeqCst), 2);
    // login, wifi, name, apiVer, then the zone request twice
    assert_eq!(connections.load(Ordering::SeqCst), 6);
}
