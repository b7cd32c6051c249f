//! Protocol sniffing for the shared port.
//!
//! # Data Flow
//! ```text
//! accepted stream
//!     → sniffer.rs (pure: buffered bytes → decision)
//!     → TLS record?   → tokio-rustls acceptor → sniff again (TLS off)
//!     → gzip magic?   → gzip.rs inflate/deflate → sniff again (gzip off)
//!     → otherwise     → hyper HTTP/1 connection serving the axum router
//! ```
//!
//! # Design Decisions
//! - The decision logic is a pure transition over a layer bitmask, so it is
//!   tested without sockets
//! - The driver loops instead of recursing; each layer receives the sniffed
//!   bytes exactly once through `Rewind`
//! - Sniffing never fails on unknown input: it goes to the HTTP parser

pub mod gzip;
pub mod pipeline;
pub mod rewind;
pub mod sniffer;

pub use pipeline::{DispatchError, Dispatcher, TransportInfo};
pub use sniffer::{Decision, Layers, SniffState, Stage, SNIFF_LEN};
