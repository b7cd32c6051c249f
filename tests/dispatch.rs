//! End-to-end tests over real loopback sockets.

mod common;

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::{body_of, eventually, gunzip, gzip, raw_exchange, start_server};

const TRANSPORT_REQUEST: &[u8] =
    b"GET /transport HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";

#[tokio::test]
async fn plain_http_is_served() {
    let server = start_server(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");

    let transport: Value = serde_json::from_str(
        &client
            .get(server.url("/transport"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(transport["layers"], "none");
    assert!(transport["connection"].as_str().unwrap().starts_with("conn-"));

    server.stop().await;
}

#[tokio::test]
async fn json_body_is_echoed() {
    let server = start_server(|_| {}).await;
    let response = reqwest::Client::new()
        .post(server.url("/echo"))
        .body(r#"{"a":1,"b":[1,2,3],"s":"café"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let value: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(value, json!({"a": 1, "b": [1, 2, 3], "s": "café"}));

    server.stop().await;
}

#[tokio::test]
async fn malformed_json_is_rejected_with_location() {
    let server = start_server(|_| {}).await;
    let response = reqwest::Client::new()
        .post(server.url("/echo"))
        .body("{a:1,}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let value: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(value["line"], 1);
    assert_eq!(value["column"], 2);

    server.stop().await;
}

#[tokio::test]
async fn lenient_json_can_be_enabled() {
    let server = start_server(|config| config.json.lenient = true).await;
    let response = reqwest::Client::new()
        .post(server.url("/echo"))
        .body("{a:1,}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let value: Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(value, json!({"a": 1}));

    server.stop().await;
}

#[tokio::test]
async fn gzip_wrapped_http_is_served_on_the_same_port() {
    let server = start_server(|_| {}).await;

    let response = raw_exchange(server.addr, &gzip(TRANSPORT_REQUEST)).await;
    let text = gunzip(&response);
    assert!(text.starts_with("HTTP/1.1 200"), "{text}");
    let value: Value = serde_json::from_str(body_of(&text)).unwrap();
    assert_eq!(value["layers"], "gzip");

    // Plain HTTP still works next to it.
    let response = raw_exchange(server.addr, TRANSPORT_REQUEST).await;
    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200"), "{text}");

    server.stop().await;
}

#[tokio::test]
async fn gzip_detection_can_be_disabled() {
    let server = start_server(|config| config.sniff.detect_gzip = false).await;
    let response = raw_exchange(server.addr, &gzip(TRANSPORT_REQUEST)).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"), "{text}");
    server.stop().await;
}

#[tokio::test]
async fn request_split_before_sniff_threshold() {
    let server = start_server(|_| {}).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GE").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(&TRANSPORT_REQUEST[2..]).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
        .await
        .unwrap();
    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200"), "{text}");
    server.stop().await;
}

#[tokio::test]
async fn connections_are_tracked_and_released() {
    let server = start_server(|_| {}).await;
    let idle = TcpStream::connect(server.addr).await.unwrap();
    let registry = server.registry.clone();
    assert!(eventually(|| registry.connection_count() == 1).await);

    drop(idle);
    assert!(eventually(|| registry.connection_count() == 0).await);
    // The listener stays registered while running.
    assert_eq!(registry.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_idle_connections() {
    let server = start_server(|_| {}).await;
    let mut idle = TcpStream::connect(server.addr).await.unwrap();
    idle.write_all(b"GE").await.unwrap();
    let registry = server.registry.clone();
    assert!(eventually(|| registry.connection_count() == 1).await);

    let registry = server.stop().await;
    assert!(registry.is_closed());
    assert!(registry.is_empty());
}
