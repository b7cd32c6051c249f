//! Single-port network front-end.
//!
//! One loopback port serves plain HTTP, TLS and gzip-wrapped HTTP: every
//! connection is sniffed and layered before reaching an axum router. The crate
//! also carries the incremental message decoder and streaming JSON reader the
//! HTTP handlers are built on.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod http;
pub mod json;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;
pub mod sniff;

pub use config::PortmuxConfig;
pub use lifecycle::Shutdown;
pub use server::{Server, ServerError};
