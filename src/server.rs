//! The single-port front-end: bind, accept, sniff, serve.
//!
//! # Responsibilities
//! - Bind the first free port of the configured range
//! - Accept connections under the connection limit
//! - Register every channel and run one dispatch task per connection
//! - Drain on shutdown
//!
//! # Data Flow
//! ```text
//! PortmuxConfig
//!     → PortBinder::bind (listener registered)
//!     → Listener::accept (permit held per connection)
//!     → ConnectionRegistry::add + spawn
//!     → Dispatcher::dispatch (TLS / gzip / HTTP)
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use axum::Router;
use thiserror::Error;

use crate::config::PortmuxConfig;
use crate::http::build_router;
use crate::lifecycle::ShutdownListener;
use crate::net::{
    tls, BindError, ChannelKind, ConnectionRegistry, Listener, ListenerError, PortBinder,
    Registration,
};
use crate::sniff::Dispatcher;

/// Pause after an accept error before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listener host '{0}'")]
    Host(String),
    #[error("failed to load TLS material: {0}")]
    Tls(#[source] io::Error),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A bound server, ready to run.
pub struct Server {
    listener: Listener,
    listener_registration: Registration,
    registry: ConnectionRegistry,
    dispatcher: Dispatcher,
    port: u16,
}

impl Server {
    /// Bind according to `config` and wrap `routes` in the HTTP chain.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn bind(config: &PortmuxConfig, routes: Router) -> Result<Self, ServerError> {
        let listener_config = &config.listener;
        let host: IpAddr = listener_config
            .host
            .parse()
            .map_err(|_| ServerError::Host(listener_config.host.clone()))?;

        let router = build_router(routes, &config.http, &config.json);
        let mut dispatcher = Dispatcher::new(router)
            .detect_tls(config.sniff.detect_tls)
            .detect_gzip(config.sniff.detect_gzip);
        if let Some(tls_config) = &config.tls {
            let acceptor = tls::load_acceptor(
                Path::new(&tls_config.cert_path),
                Path::new(&tls_config.key_path),
            )
            .await
            .map_err(ServerError::Tls)?;
            dispatcher = dispatcher.with_tls(acceptor);
        }

        let registry = ConnectionRegistry::new();
        let bound = PortBinder::new(host).bind(
            listener_config.first_port,
            listener_config.port_count,
            listener_config.try_any_port,
            &registry,
        )?;
        let listener = Listener::from_std(bound.listener, listener_config.max_connections)?;

        tracing::info!(
            port = bound.port,
            max_connections = listener_config.max_connections,
            detect_tls = dispatcher.initial_state().detect_tls(),
            detect_gzip = dispatcher.initial_state().detect_gzip(),
            "Server bound"
        );

        Ok(Self {
            listener,
            listener_registration: bound.registration,
            registry,
            dispatcher,
            port: bound.port,
        })
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Registry tracking the listener and every live connection.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let Server {
            listener,
            listener_registration,
            registry,
            dispatcher,
            port,
        } = self;
        tracing::info!(port, "Accepting connections");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => break,
            };
            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(error) => {
                    tracing::warn!(%error, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
            if let Err(error) = stream.set_nodelay(true) {
                tracing::debug!(peer_addr = %peer, %error, "Failed to set TCP_NODELAY");
            }

            let registration = registry.add(ChannelKind::Connection { peer });
            let dispatcher = dispatcher.clone();
            registry.spawn(async move {
                let _permit = permit;
                let connection_id = registration.id();
                let close = registration.close_signal();
                match dispatcher.dispatch(stream, peer, connection_id, close).await {
                    Ok(layers) => {
                        tracing::debug!(%connection_id, %layers, "Connection finished");
                    }
                    Err(error) if error.is_disconnect() => {
                        tracing::debug!(%connection_id, %error, "Peer disconnected");
                    }
                    Err(error) => {
                        tracing::warn!(%connection_id, %error, "Connection failed");
                    }
                }
                drop(registration);
            });
        }

        tracing::info!(
            port,
            connections = registry.connection_count(),
            "Shutting down, draining connections"
        );
        listener.close();
        drop(listener_registration);
        registry.close(false);
        registry.wait_idle().await;
        tracing::info!(port, "Server stopped");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.port)
            .field("registry", &self.registry)
            .finish()
    }
}
