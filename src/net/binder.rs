//! Port selection for the listening socket.
//!
//! # Responsibilities
//! - Walk a configured port range and bind the first free port
//! - Never bind ports reserved for other local services
//! - Fall back to an OS-assigned port when asked
//!
//! # Design Decisions
//! - Binding is synchronous and attempted once per port; retry policy belongs
//!   to the caller
//! - The failure reported is the last OS error seen

use std::collections::BTreeSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use thiserror::Error;

use crate::net::connection::ChannelKind;
use crate::net::registry::{ConnectionRegistry, Registration};
use crate::observability::metrics;

/// Ports that are skipped even when free.
pub const FORBIDDEN_PORTS: [u16; 3] = [6953, 6969, 6970];

#[derive(Debug, Error)]
pub enum BindError {
    /// No candidate port could be bound.
    #[error("no port available on {host} in {first}..={last}: {source}")]
    Exhausted {
        host: IpAddr,
        first: u16,
        last: u16,
        #[source]
        source: io::Error,
    },
}

impl BindError {
    /// The last OS error encountered.
    pub fn last_error(&self) -> &io::Error {
        match self {
            BindError::Exhausted { source, .. } => source,
        }
    }
}

/// A bound, registered listening socket.
#[derive(Debug)]
pub struct BoundPort {
    pub port: u16,
    pub listener: TcpListener,
    /// Keeps the listener tracked by the registry.
    pub registration: Registration,
}

/// Binds the server socket inside a port range.
#[derive(Debug, Clone)]
pub struct PortBinder {
    host: IpAddr,
    forbidden: BTreeSet<u16>,
}

impl Default for PortBinder {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl PortBinder {
    /// Binder for `host` with the default forbidden ports.
    pub fn new(host: IpAddr) -> Self {
        Self {
            host,
            forbidden: FORBIDDEN_PORTS.into_iter().collect(),
        }
    }

    /// Replace the forbidden port set.
    pub fn with_forbidden_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.forbidden = ports.into_iter().collect();
        self
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn is_forbidden(&self, port: u16) -> bool {
        self.forbidden.contains(&port)
    }

    /// Candidate ports in order, clamped at 65535, forbidden ports removed.
    pub fn candidates(&self, first_port: u16, port_count: u16) -> impl Iterator<Item = u16> + '_ {
        let end = (u32::from(first_port) + u32::from(port_count)).min(u32::from(u16::MAX) + 1);
        (u32::from(first_port)..end)
            .map(|port| port as u16)
            .filter(move |port| !self.is_forbidden(*port))
    }

    /// Bind the first free port of `first_port..first_port + port_count`.
    ///
    /// When every candidate fails and `try_any_port` is set, port 0 is bound
    /// and the OS-assigned port is reported. The listener is registered with
    /// `registry` before returning.
    pub fn bind(
        &self,
        first_port: u16,
        port_count: u16,
        try_any_port: bool,
        registry: &ConnectionRegistry,
    ) -> Result<BoundPort, BindError> {
        let last = first_port.saturating_add(port_count.saturating_sub(1));
        let mut last_error: Option<io::Error> = None;

        for port in self.candidates(first_port, port_count) {
            match TcpListener::bind(SocketAddr::new(self.host, port)) {
                Ok(listener) => return self.finish(listener, registry, first_port, last),
                Err(error) => {
                    tracing::debug!(port, error = %error, "Port unavailable");
                    metrics::bind_failed();
                    last_error = Some(error);
                }
            }
        }

        if try_any_port {
            match TcpListener::bind(SocketAddr::new(self.host, 0)) {
                Ok(listener) => {
                    tracing::info!(
                        first_port,
                        last_port = last,
                        "Configured range exhausted, using an ephemeral port"
                    );
                    return self.finish(listener, registry, first_port, last);
                }
                Err(error) => {
                    metrics::bind_failed();
                    last_error = Some(error);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "every candidate port is forbidden",
            )
        });
        tracing::error!(first_port, last_port = last, error = %source, "Unable to bind");
        Err(BindError::Exhausted {
            host: self.host,
            first: first_port,
            last,
            source,
        })
    }

    fn finish(
        &self,
        listener: TcpListener,
        registry: &ConnectionRegistry,
        first: u16,
        last: u16,
    ) -> Result<BoundPort, BindError> {
        let local = listener.local_addr().map_err(|source| BindError::Exhausted {
            host: self.host,
            first,
            last,
            source,
        })?;
        let registration = registry.add(ChannelKind::Listener { local });
        tracing::info!(address = %local, "Listener bound");
        Ok(BoundPort {
            port: local.port(),
            listener,
            registration,
        })
    }
}
