//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Port range from config
//!     → binder.rs (first free port, forbidden ports, ephemeral fallback)
//!     → listener.rs (accept loop, connection limits)
//!     → registry.rs (track channel, close signal, RAII deregistration)
//!     → Hand off to the protocol sniffer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Every channel is registered so shutdown can reach it
//! - TLS is optional and only terminated when the sniffer sees a handshake

pub mod binder;
pub mod connection;
pub mod listener;
pub mod registry;
pub mod tls;

pub use binder::{BindError, BoundPort, PortBinder, FORBIDDEN_PORTS};
pub use connection::{ChannelKind, ConnectionId};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use registry::{CloseSignal, ConnectionRegistry, Registration};
