//! Incremental decoding of fragmented network reads.
//!
//! # Data Flow
//! ```text
//! arbitrarily sized chunks (one per socket read)
//!     → cumulation.rs (Empty | Single | Composite pending buffer)
//!     → decoder.rs (FrameDecoder decides how many bytes the next unit needs)
//!     → whole frames / messages
//!
//! Text payloads:
//!     chunks → message.rs (incremental UTF-8 into a reusable String)
//!            → json reader
//! ```
//!
//! # Design Decisions
//! - A chunk that already satisfies the requirement is sliced, never copied
//! - A second fragment promotes the pending buffer to an owned composite
//! - Surplus bytes after a frame stay pending for the next one
//! - Pending state is released on drop, so a half message is discarded on close

pub mod cumulation;
pub mod decoder;
pub mod message;

pub use cumulation::{Cumulation, PendingBuffer};
pub use decoder::{FixedLength, FrameDecoder, IncrementalDecoder, LengthPrefixed};
pub use message::MessageDecoder;

use thiserror::Error;

/// Errors raised once enough bytes exist to judge the input as malformed.
///
/// "Not enough bytes yet" is never an error; it is reported as `None`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A length prefix announced a frame larger than the configured maximum.
    #[error("frame of {declared} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { declared: usize, max: usize },

    /// The byte stream is not valid UTF-8.
    #[error("invalid UTF-8 sequence at byte offset {offset}")]
    InvalidUtf8 { offset: usize },
}
