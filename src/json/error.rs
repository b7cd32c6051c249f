//! JSON reader errors.

use thiserror::Error;

/// Errors raised by [`JsonReader`](super::JsonReader).
///
/// Every variant except [`Closed`](JsonError::Closed) carries the location of
/// the offending input so a rejected request can point at the exact spot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JsonError {
    /// Structural or lexical violation.
    #[error("{message} at line {line} column {column} path {path}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        path: String,
    },

    /// A number was read but cannot be represented exactly in the requested type.
    #[error("Expected {expected} but was {literal} at line {line} column {column} path {path}")]
    PrecisionLoss {
        literal: String,
        expected: &'static str,
        line: usize,
        column: usize,
        path: String,
    },

    /// A value that should be numeric does not parse as a number, or is NaN or
    /// infinite outside lenient mode.
    #[error("Invalid number {literal:?} at line {line} column {column} path {path}")]
    InvalidNumber {
        literal: String,
        line: usize,
        column: usize,
        path: String,
    },

    #[error("JsonReader is closed")]
    Closed,
}

impl JsonError {
    /// 1-based line of the error, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            JsonError::Syntax { line, .. }
            | JsonError::PrecisionLoss { line, .. }
            | JsonError::InvalidNumber { line, .. } => Some(*line),
            JsonError::Closed => None,
        }
    }

    /// 1-based column (in characters) of the error, if known.
    pub fn column(&self) -> Option<usize> {
        match self {
            JsonError::Syntax { column, .. }
            | JsonError::PrecisionLoss { column, .. }
            | JsonError::InvalidNumber { column, .. } => Some(*column),
            JsonError::Closed => None,
        }
    }

    pub fn is_precision_loss(&self) -> bool {
        matches!(self, JsonError::PrecisionLoss { .. })
    }
}
