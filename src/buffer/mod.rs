//! Byte buffer primitives.
//!
//! # Data Flow
//! ```text
//! fragment retained by a Cumulation
//!     → cursor.rs (append at the write cursor)
//!     → consumers split whole units off the read cursor (zero-copy `Bytes`)
//!     → compact() reclaims the consumed prefix
//! ```
//!
//! # Design Decisions
//! - Backed by `bytes::BytesMut` so split-off units share the allocation
//! - Read and write positions are monotonic counters for diagnostics

pub mod cursor;

pub use cursor::ByteCursor;
