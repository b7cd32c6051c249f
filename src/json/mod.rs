//! Streaming JSON reader.
//!
//! A pull parser over a borrowed text buffer, used to consume request bodies
//! without building an intermediate tree.
//!
//! # Responsibilities
//! - Classify the next token lazily and cache it until consumed
//! - Return strings as slices of the input until an escape forces a copy
//! - Convert numbers on demand, reporting precision loss instead of rounding
//! - Accept malformed-but-common JSON in lenient mode
//!
//! # Data Flow
//! ```text
//! &str ──▶ peek() ──▶ cached Peeked ──▶ next_*() / skip_value() / read_value()
//!              │
//!              └──▶ sub_reader() ──▶ independent JsonReader over the same text
//! ```
//!
//! # Design Decisions
//! - The scope stack and the skip counter replace recursion, so nesting depth
//!   is limited by memory only
//! - Integral literals are accumulated as negated `i64` so `i64::MIN` parses
//!   without overflow

mod error;
mod reader;
mod token;
mod value;

pub use error::JsonError;
pub use reader::JsonReader;
pub use token::{JsonNumber, TokenKind};
