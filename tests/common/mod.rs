//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use portmux::http::demo_routes;
use portmux::net::ConnectionRegistry;
use portmux::{PortmuxConfig, Server, Shutdown};

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: ConnectionRegistry,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the accept loop to drain.
    pub async fn stop(self) -> ConnectionRegistry {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not drain in time")
            .unwrap();
        self.registry
    }
}

/// Start the demo routes with defaults adjusted by `configure`.
pub async fn start_server(configure: impl FnOnce(&mut PortmuxConfig)) -> TestServer {
    let mut config = PortmuxConfig::default();
    config.listener.port_count = 0;
    config.listener.try_any_port = true;
    configure(&mut config);

    let server = Server::bind(&config, demo_routes()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry().clone();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(shutdown.subscribe()));
    TestServer {
        addr,
        registry,
        shutdown,
        task,
    }
}

/// Write `request`, half-close, and read until the server closes.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not close the connection")
        .unwrap();
    response
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn gunzip(data: &[u8]) -> String {
    let mut text = String::new();
    GzDecoder::new(data).read_to_string(&mut text).unwrap();
    text
}

/// Body of a raw HTTP/1.1 response.
pub fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
