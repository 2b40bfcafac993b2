// Integration tests for the reader clients: wiremock for HTTP, a loopback
// tungstenite server for the WebSocket session.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockpulse_api::{
    AlertPayload, Error, InitFrame, Inbound, PollClient, ReaderSocket, TransportConfig,
    WebhookClient,
};

// ── Helpers ─────────────────────────────────────────────────────────

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn poll_client(server: &MockServer, token: Option<&str>) -> PollClient {
    let url = Url::parse(&format!("{}/scans", server.uri())).unwrap();
    let transport = TransportConfig::default().bearer(token.map(|t| SecretString::from(t.to_string())));
    PollClient::new(url, &transport).unwrap()
}

// ── Poll client ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_sends_cursor_and_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scans"))
        .and(query_param("since_id", "41"))
        .and(header("authorization", "Bearer reader-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scans": [
                { "scan_id": 42, "rfid_tags": ["T1", "T2"] },
                { "scan_id": 43, "rfid_tags": [] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = poll_client(&server, Some("reader-key"));
    let resp = client.fetch(Some(41)).await.unwrap();

    assert_eq!(resp.scans.len(), 2);
    assert_eq!(resp.scans[0].scan_id, Some(42));
    assert_eq!(resp.scans[0].rfid_tags, vec!["T1", "T2"]);
}

#[tokio::test]
async fn test_poll_without_cursor_omits_since_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scans": [] })))
        .mount(&server)
        .await;

    let client = poll_client(&server, None);
    let resp = client.fetch(None).await.unwrap();
    assert!(resp.scans.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().is_none());
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_poll_non_success_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scans"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = poll_client(&server, None).fetch(None).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 503 }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_poll_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/scans"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = poll_client(&server, None).fetch(None).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}

// ── Webhook ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_webhook_posts_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(json!({
            "source": "rfid_system",
            "severity": "critical",
            "message": "RFID reader dock restarted due to excessive errors"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/alerts", server.uri())).unwrap();
    let client = WebhookClient::new(url, &TransportConfig::default()).unwrap();
    client
        .post(&AlertPayload {
            source: "rfid_system".into(),
            severity: "critical".into(),
            message: "RFID reader dock restarted due to excessive errors".into(),
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_webhook_rejection_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/alerts", server.uri())).unwrap();
    let client = WebhookClient::new(url, &TransportConfig::default()).unwrap();
    let err = client
        .post(&AlertPayload {
            source: "rfid_system".into(),
            severity: "critical".into(),
            message: "x".into(),
            timestamp: chrono::Utc::now(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

// ── WebSocket ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_socket_round_trip_with_reader() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let reader = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let init = ws.next().await.unwrap().unwrap();
        let init: serde_json::Value = serde_json::from_str(init.to_text().unwrap()).unwrap();

        ws.send(Message::Ping(vec![1].into())).await.unwrap();
        ws.send(Message::text(r#"{"event_type":"scan","rfid_tags":["T1"]}"#))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
        init
    });

    let url = Url::parse(&format!("ws://{addr}/events")).unwrap();
    let mut socket = ReaderSocket::connect(&url, None, CONNECT_TIMEOUT).await.unwrap();
    socket.send_json(&InitFrame::new("entrance")).await.unwrap();

    let first = socket.recv().await.unwrap();
    assert_eq!(
        first,
        Inbound::Text(r#"{"event_type":"scan","rfid_tags":["T1"]}"#.into())
    );
    let second = socket.recv().await.unwrap();
    assert!(matches!(second, Inbound::Closed { .. }));

    let init = reader.await.unwrap();
    assert_eq!(init["action"], "initialize");
    assert_eq!(init["reader_id"], "entrance");
}

#[tokio::test]
async fn test_socket_connect_refused() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/events")).unwrap();
    let err = ReaderSocket::connect(&url, None, CONNECT_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::WebSocketConnect(_)));
}

#[tokio::test]
async fn test_socket_handshake_times_out_on_silent_reader() {
    // Accepts TCP but never answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reader = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(tcp);
    });

    let url = Url::parse(&format!("ws://{addr}/events")).unwrap();
    let started = std::time::Instant::now();
    let err = ReaderSocket::connect(&url, None, Duration::from_millis(200))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        Error::WebSocketConnect(message) => {
            assert_eq!(message, "handshake timed out after 200ms");
        }
        other => panic!("expected WebSocketConnect, got {other:?}"),
    }
    reader.abort();
}
