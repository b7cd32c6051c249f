//! Token kinds and reader bookkeeping types.

use std::fmt;

/// Kind of the next token, as reported by [`JsonReader::peek`](super::JsonReader::peek).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    BeginArray,
    EndArray,
    BeginObject,
    EndObject,
    Name,
    String,
    Number,
    Boolean,
    Null,
    EndDocument,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::BeginArray => "BEGIN_ARRAY",
            TokenKind::EndArray => "END_ARRAY",
            TokenKind::BeginObject => "BEGIN_OBJECT",
            TokenKind::EndObject => "END_OBJECT",
            TokenKind::Name => "NAME",
            TokenKind::String => "STRING",
            TokenKind::Number => "NUMBER",
            TokenKind::Boolean => "BOOLEAN",
            TokenKind::Null => "NULL",
            TokenKind::EndDocument => "END_DOCUMENT",
        };
        f.write_str(name)
    }
}

/// A numeric value read without choosing the target type up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JsonNumber {
    /// Integral literal that fits in 64 bits.
    Long(i64),
    Double(f64),
}

/// Cached classification of the next token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Peeked {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    True,
    False,
    Null,
    SingleQuoted,
    DoubleQuoted,
    Unquoted,
    /// A string value already read into the reader's buffered slot.
    Buffered,
    SingleQuotedName,
    DoubleQuotedName,
    UnquotedName,
    /// Integral literal whose value is held in `peeked_long`.
    Long,
    /// Any other numeric literal; only its span is recorded.
    Number,
    Eof,
}

impl Peeked {
    pub(crate) fn kind(self) -> TokenKind {
        match self {
            Peeked::BeginObject => TokenKind::BeginObject,
            Peeked::EndObject => TokenKind::EndObject,
            Peeked::BeginArray => TokenKind::BeginArray,
            Peeked::EndArray => TokenKind::EndArray,
            Peeked::True | Peeked::False => TokenKind::Boolean,
            Peeked::Null => TokenKind::Null,
            Peeked::SingleQuoted | Peeked::DoubleQuoted | Peeked::Unquoted | Peeked::Buffered => {
                TokenKind::String
            }
            Peeked::SingleQuotedName | Peeked::DoubleQuotedName | Peeked::UnquotedName => {
                TokenKind::Name
            }
            Peeked::Long | Peeked::Number => TokenKind::Number,
            Peeked::Eof => TokenKind::EndDocument,
        }
    }
}

/// Nesting marker kept on the reader's scope stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    EmptyArray,
    NonEmptyArray,
    EmptyObject,
    /// A name has been read; its value has not.
    DanglingName,
    NonEmptyObject,
    EmptyDocument,
    NonEmptyDocument,
    Closed,
}

/// Position inside a numeric literal while scanning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumberChar {
    None,
    Sign,
    Digit,
    Decimal,
    FractionDigit,
    ExpE,
    ExpSign,
    ExpDigit,
}
