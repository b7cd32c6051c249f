//! Per-connection dispatch driven by the sniffer.
//!
//! Each accepted stream starts in the sniffing stage. Every decision wraps the
//! current stream in one more layer and replays the bytes read so far into it,
//! until the HTTP chain takes over.

use std::io;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use bytes::BytesMut;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::codec::Cumulation;
use crate::net::{CloseSignal, ConnectionId};
use crate::observability::metrics;
use crate::sniff::gzip::GzipStream;
use crate::sniff::rewind::Rewind;
use crate::sniff::sniffer::{Decision, Layers, SniffState};

/// Read size while sniffing.
const SNIFF_READ: usize = 512;

/// Any stream a layer can be stacked on.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type BoxedIo = Box<dyn Io>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("I/O error while sniffing: {0}")]
    Io(#[from] io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
    #[error("TLS detected but no certificate is configured")]
    TlsUnavailable,
    #[error("HTTP connection error: {0}")]
    Http(#[from] hyper::Error),
}

impl DispatchError {
    /// Whether the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        let io_gone = |e: &io::Error| {
            matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        };
        match self {
            DispatchError::Io(e) | DispatchError::Handshake(e) => io_gone(e),
            DispatchError::Http(e) => e.is_incomplete_message() || e.is_canceled(),
            DispatchError::TlsUnavailable => false,
        }
    }
}

/// Connection facts exposed to HTTP handlers as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportInfo {
    pub connection_id: ConnectionId,
    pub peer: SocketAddr,
    /// Layers terminated below HTTP.
    pub layers: Layers,
}

/// Runs the sniffing loop and hands decided streams to the HTTP chain.
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
    tls: Option<TlsAcceptor>,
    detect_tls: bool,
    detect_gzip: bool,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            tls: None,
            detect_tls: true,
            detect_gzip: true,
        }
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn detect_tls(mut self, enabled: bool) -> Self {
        self.detect_tls = enabled;
        self
    }

    pub fn detect_gzip(mut self, enabled: bool) -> Self {
        self.detect_gzip = enabled;
        self
    }

    /// Starting state; TLS detection needs an acceptor.
    pub fn initial_state(&self) -> SniffState {
        SniffState::new(self.detect_tls && self.tls.is_some(), self.detect_gzip)
    }

    /// Serve one connection until it ends or `close` fires.
    ///
    /// Returns the layers that were installed.
    pub async fn dispatch<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        connection_id: ConnectionId,
        mut close: CloseSignal,
    ) -> Result<Layers, DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut io: BoxedIo = Box::new(stream);
        let mut state = self.initial_state();
        // Bytes read but not yet handed to a layer; each read is one chunk.
        let mut sniffed = Cumulation::new();
        let mut scratch = BytesMut::new();

        loop {
            let (next, decision) = state.advance(sniffed.readable());
            state = next;
            if let Some(protocol) = decision.protocol() {
                tracing::debug!(
                    connection_id = %connection_id,
                    protocol,
                    buffered = sniffed.len(),
                    "Protocol decided"
                );
                metrics::sniff_decision(protocol);
            }

            match decision {
                Decision::NeedMoreBytes => {
                    scratch.reserve(SNIFF_READ);
                    let read = tokio::select! {
                        read = io.read_buf(&mut scratch) => read?,
                        _ = close.closed() => {
                            tracing::debug!(connection_id = %connection_id, "Closed while sniffing");
                            return Ok(state.installed());
                        }
                    };
                    if read == 0 {
                        tracing::debug!(
                            connection_id = %connection_id,
                            buffered = sniffed.len(),
                            "Peer closed before a protocol was decided"
                        );
                        return Ok(state.installed());
                    }
                    sniffed.push(scratch.split().freeze());
                }
                Decision::InstallTls => {
                    let acceptor = self.tls.clone().ok_or(DispatchError::TlsUnavailable)?;
                    let replay = Rewind::new(io, sniffed.take_all());
                    let tls = tokio::select! {
                        tls = acceptor.accept(replay) => tls.map_err(DispatchError::Handshake)?,
                        _ = close.closed() => return Ok(state.installed()),
                    };
                    io = Box::new(tls);
                }
                Decision::InstallGzip => {
                    io = Box::new(GzipStream::new(Rewind::new(io, sniffed.take_all())));
                }
                Decision::InstallHttp => {
                    let replay = Rewind::new(io, sniffed.take_all());
                    let transport = TransportInfo {
                        connection_id,
                        peer,
                        layers: state.installed(),
                    };
                    self.serve_http(replay, transport, close).await?;
                    return Ok(state.installed());
                }
                Decision::Done => return Ok(state.installed()),
            }
        }
    }

    async fn serve_http<S>(
        &self,
        io: S,
        transport: TransportInfo,
        mut close: CloseSignal,
    ) -> Result<(), DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = ServiceExt::<Request<Incoming>>::map_request(
            self.router.clone(),
            move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(transport.peer));
                request.extensions_mut().insert(transport);
                request
            },
        );
        let connection = http1::Builder::new()
            .keep_alive(true)
            .serve_connection(TokioIo::new(io), TowerToHyperService::new(service));
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => result?,
            _ = close.closed() => {
                tracing::debug!(connection_id = %transport.connection_id, "Draining HTTP connection");
                connection.as_mut().graceful_shutdown();
                connection.await?;
            }
        }
        Ok(())
    }
}
