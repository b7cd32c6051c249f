//! Pull tokenizer over an in-memory JSON document.

use std::borrow::Cow;
use std::fmt::Write as _;

use super::error::JsonError;
use super::token::{JsonNumber, NumberChar, Peeked, Scope, TokenKind};

/// Prefix some servers put in front of JSON to defeat script inclusion.
const NON_EXECUTE_PREFIX: &[u8] = b")]}'\n";

const LENIENT_HINT: &str = "Use lenient mode to accept malformed JSON";

/// Streaming reader over a borrowed JSON text.
///
/// Tokens are classified lazily: [`peek`](Self::peek) computes and caches the
/// kind of the next token and every consuming call clears the cache. Strings
/// without escapes are returned as slices of the source.
///
/// ```
/// use portmux::json::JsonReader;
///
/// let mut reader = JsonReader::new(r#"{"id": 7, "tags": ["a", "b"]}"#);
/// reader.begin_object().unwrap();
/// assert_eq!(reader.next_name().unwrap(), "id");
/// assert_eq!(reader.next_long().unwrap(), 7);
/// assert_eq!(reader.next_name().unwrap(), "tags");
/// reader.skip_value().unwrap();
/// reader.end_object().unwrap();
/// assert!(!reader.has_next().unwrap());
/// ```
#[derive(Debug)]
pub struct JsonReader<'a> {
    src: &'a str,
    pos: usize,
    lenient: bool,

    peeked: Option<Peeked>,
    /// Value of a `Peeked::Long` token.
    peeked_long: i64,
    /// Span of a `Peeked::Long` or `Peeked::Number` token.
    number_start: usize,
    number_len: usize,
    /// String value held for `Peeked::Buffered`.
    buffered: Option<Cow<'a, str>>,

    /// Never empty while open; the bottom entry is the document marker.
    stack: Vec<Scope>,
    path_names: Vec<Option<Cow<'a, str>>>,
    path_indices: Vec<usize>,

    /// Scratch space for strings containing escapes.
    builder: String,
}

impl<'a> JsonReader<'a> {
    /// Create a strict reader over `src`.
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            lenient: false,
            peeked: None,
            peeked_long: 0,
            number_start: 0,
            number_len: 0,
            buffered: None,
            stack: vec![Scope::EmptyDocument],
            path_names: vec![None],
            path_indices: vec![0],
            builder: String::new(),
        }
    }

    /// Builder-style switch for lenient parsing.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn set_lenient(&mut self, lenient: bool) {
        self.lenient = lenient;
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// Byte offset of the cursor in the source text.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The text this reader was created over.
    pub fn source(&self) -> &'a str {
        self.src
    }

    // ── Structure ────────────────────────────────────────────────────────────

    pub fn begin_array(&mut self) -> Result<(), JsonError> {
        match self.peek_internal()? {
            Peeked::BeginArray => {
                self.push(Scope::EmptyArray);
                self.peeked = None;
                Ok(())
            }
            p => Err(self.unexpected("BEGIN_ARRAY", p)),
        }
    }

    pub fn end_array(&mut self) -> Result<(), JsonError> {
        match self.peek_internal()? {
            Peeked::EndArray => {
                self.pop();
                self.peeked = None;
                self.increment_index();
                Ok(())
            }
            p => Err(self.unexpected("END_ARRAY", p)),
        }
    }

    pub fn begin_object(&mut self) -> Result<(), JsonError> {
        match self.peek_internal()? {
            Peeked::BeginObject => {
                self.push(Scope::EmptyObject);
                self.peeked = None;
                Ok(())
            }
            p => Err(self.unexpected("BEGIN_OBJECT", p)),
        }
    }

    pub fn end_object(&mut self) -> Result<(), JsonError> {
        match self.peek_internal()? {
            Peeked::EndObject => {
                self.pop();
                self.peeked = None;
                self.increment_index();
                Ok(())
            }
            p => Err(self.unexpected("END_OBJECT", p)),
        }
    }

    /// Whether the current array or object has another element.
    ///
    /// At the top level this is `false` once the document has been consumed.
    pub fn has_next(&mut self) -> Result<bool, JsonError> {
        let p = self.peek_internal()?;
        Ok(!matches!(p, Peeked::EndObject | Peeked::EndArray | Peeked::Eof))
    }

    /// Kind of the next token, without consuming it.
    pub fn peek(&mut self) -> Result<TokenKind, JsonError> {
        Ok(self.peek_internal()?.kind())
    }

    // ── Values ───────────────────────────────────────────────────────────────

    /// Consume a property name.
    pub fn next_name(&mut self) -> Result<Cow<'a, str>, JsonError> {
        let name = match self.peek_internal()? {
            Peeked::UnquotedName => self.next_unquoted_value(),
            Peeked::SingleQuotedName => self.next_quoted_value(b'\'')?,
            Peeked::DoubleQuotedName => self.next_quoted_value(b'"')?,
            p => return Err(self.unexpected("a name", p)),
        };
        self.peeked = None;
        if let Some(slot) = self.path_names.last_mut() {
            *slot = Some(name.clone());
        }
        Ok(name)
    }

    /// Consume the next property name, or return `None` at the end of the object.
    pub fn next_name_or_none(&mut self) -> Result<Option<Cow<'a, str>>, JsonError> {
        if !self.has_next()? {
            return Ok(None);
        }
        self.next_name().map(Some)
    }

    /// Consume a string value. Numbers are returned as their literal text.
    pub fn next_string(&mut self) -> Result<Cow<'a, str>, JsonError> {
        let value = match self.peek_internal()? {
            Peeked::Unquoted => self.next_unquoted_value(),
            Peeked::SingleQuoted => self.next_quoted_value(b'\'')?,
            Peeked::DoubleQuoted => self.next_quoted_value(b'"')?,
            Peeked::Buffered => self.buffered.take().unwrap_or_default(),
            Peeked::Long | Peeked::Number => Cow::Borrowed(self.consume_number_literal()),
            p => return Err(self.unexpected("a string", p)),
        };
        self.peeked = None;
        self.increment_index();
        Ok(value)
    }

    /// Consume a string value, or a `null` which yields `None`.
    pub fn next_string_or_none(&mut self) -> Result<Option<Cow<'a, str>>, JsonError> {
        if self.peek_internal()? == Peeked::Null {
            self.next_null()?;
            return Ok(None);
        }
        self.next_string().map(Some)
    }

    pub fn next_boolean(&mut self) -> Result<bool, JsonError> {
        let value = match self.peek_internal()? {
            Peeked::True => true,
            Peeked::False => false,
            p => return Err(self.unexpected("a boolean", p)),
        };
        self.peeked = None;
        self.increment_index();
        Ok(value)
    }

    pub fn next_null(&mut self) -> Result<(), JsonError> {
        match self.peek_internal()? {
            Peeked::Null => {
                self.peeked = None;
                self.increment_index();
                Ok(())
            }
            p => Err(self.unexpected("null", p)),
        }
    }

    /// Consume a number (or a numeric string) as `f64`.
    ///
    /// NaN and infinities are only accepted in lenient mode.
    pub fn next_double(&mut self) -> Result<f64, JsonError> {
        let value = match self.peek_internal()? {
            Peeked::Long => {
                self.consume_number_literal();
                self.peeked_long as f64
            }
            Peeked::Number => {
                let start = self.number_start;
                let literal = self.number_literal();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| self.invalid_number(literal, start))?;
                self.consume_number_literal();
                value
            }
            Peeked::SingleQuoted | Peeked::DoubleQuoted | Peeked::Unquoted | Peeked::Buffered => {
                let start = self.pos;
                let literal = self.buffer_string()?;
                literal
                    .parse::<f64>()
                    .map_err(|_| self.invalid_number(&literal, start))?
            }
            p => return Err(self.unexpected("a double", p)),
        };
        if !self.lenient && !value.is_finite() {
            return Err(self.syntax_error(format!("JSON forbids NaN and infinities: {value}")));
        }
        self.peeked = None;
        self.buffered = None;
        self.increment_index();
        Ok(value)
    }

    /// Consume a number (or a numeric string) as `i64`.
    ///
    /// Fails with [`JsonError::PrecisionLoss`] when the value has a fractional
    /// part or lies outside the `i64` range.
    pub fn next_long(&mut self) -> Result<i64, JsonError> {
        let value = match self.peek_internal()? {
            Peeked::Long => {
                self.consume_number_literal();
                self.peeked_long
            }
            Peeked::Number => {
                let start = self.number_start;
                let literal = self.number_literal();
                let value = self.parse_exact_long(literal, start, "a long")?;
                self.consume_number_literal();
                value
            }
            Peeked::SingleQuoted | Peeked::DoubleQuoted | Peeked::Unquoted | Peeked::Buffered => {
                let start = self.pos;
                let literal = self.buffer_string()?;
                self.parse_exact_long(&literal, start, "a long")?
            }
            p => return Err(self.unexpected("a long", p)),
        };
        self.peeked = None;
        self.buffered = None;
        self.increment_index();
        Ok(value)
    }

    /// Consume a number (or a numeric string) as `i32`.
    pub fn next_int(&mut self) -> Result<i32, JsonError> {
        let (wide, start, literal) = match self.peek_internal()? {
            Peeked::Long => (self.peeked_long, self.number_start, Cow::Borrowed(self.number_literal())),
            Peeked::Number => {
                let start = self.number_start;
                let literal = self.number_literal();
                (self.parse_exact_long(literal, start, "an int")?, start, Cow::Borrowed(literal))
            }
            Peeked::SingleQuoted | Peeked::DoubleQuoted | Peeked::Unquoted | Peeked::Buffered => {
                let start = self.pos;
                let literal = self.buffer_string()?;
                (self.parse_exact_long(&literal, start, "an int")?, start, literal)
            }
            p => return Err(self.unexpected("an int", p)),
        };
        let value = i32::try_from(wide).map_err(|_| self.precision_loss(&literal, "an int", start))?;
        if matches!(self.peeked, Some(Peeked::Long | Peeked::Number)) {
            self.consume_number_literal();
        }
        self.peeked = None;
        self.buffered = None;
        self.increment_index();
        Ok(value)
    }

    /// Consume a number, keeping integral literals that fit in 64 bits exact.
    pub fn next_number(&mut self) -> Result<JsonNumber, JsonError> {
        if self.peek_internal()? == Peeked::Long {
            return self.next_long().map(JsonNumber::Long);
        }
        self.next_double().map(JsonNumber::Double)
    }

    // ── Skipping and forking ─────────────────────────────────────────────────

    /// Skip the next value, including every nested array and object.
    ///
    /// Nesting is tracked with a counter and the scope stack, never with
    /// recursion. When the next token is a name only the name is skipped.
    pub fn skip_value(&mut self) -> Result<(), JsonError> {
        let mut depth: usize = 0;
        let mut skipped_name = false;
        loop {
            let p = self.peek_internal()?;
            match p {
                Peeked::BeginArray => {
                    self.push(Scope::EmptyArray);
                    depth += 1;
                }
                Peeked::BeginObject => {
                    self.push(Scope::EmptyObject);
                    depth += 1;
                }
                Peeked::EndArray | Peeked::EndObject => {
                    if depth == 0 {
                        return Err(self.unexpected("a value", p));
                    }
                    self.pop();
                    depth -= 1;
                }
                Peeked::UnquotedName | Peeked::Unquoted => {
                    skipped_name = p == Peeked::UnquotedName;
                    self.skip_unquoted_value();
                }
                Peeked::SingleQuoted | Peeked::SingleQuotedName => {
                    skipped_name = p == Peeked::SingleQuotedName;
                    self.skip_quoted_value(b'\'')?;
                }
                Peeked::DoubleQuoted | Peeked::DoubleQuotedName => {
                    skipped_name = p == Peeked::DoubleQuotedName;
                    self.skip_quoted_value(b'"')?;
                }
                Peeked::Long | Peeked::Number => {
                    self.consume_number_literal();
                }
                Peeked::Eof => return Err(self.syntax_error("End of input")),
                Peeked::True | Peeked::False | Peeked::Null | Peeked::Buffered => {}
            }
            self.peeked = None;
            self.buffered = None;
            if depth == 0 {
                break;
            }
            skipped_name = false;
        }
        if skipped_name && depth == 0 {
            if let Some(slot) = self.path_names.last_mut() {
                *slot = Some(Cow::Borrowed("<skipped>"));
            }
        } else {
            self.increment_index();
        }
        Ok(())
    }

    /// Skip every remaining element of the current array or object.
    pub fn skip_values(&mut self) -> Result<(), JsonError> {
        while self.has_next()? {
            self.skip_value()?;
        }
        Ok(())
    }

    /// Fork an independent reader positioned at the next value.
    ///
    /// The fork shares the source text and copies the cursor, the lookahead
    /// cache and the scope stack. Returns `None` when the next value is `null`;
    /// in every case the parent is left untouched and normally continues with
    /// [`skip_value`](Self::skip_value).
    pub fn sub_reader(&mut self) -> Result<Option<JsonReader<'a>>, JsonError> {
        match self.peek_internal()? {
            Peeked::Null => Ok(None),
            Peeked::BeginArray
            | Peeked::BeginObject
            | Peeked::True
            | Peeked::False
            | Peeked::SingleQuoted
            | Peeked::DoubleQuoted
            | Peeked::Unquoted
            | Peeked::Buffered
            | Peeked::Long
            | Peeked::Number => Ok(Some(self.fork())),
            p => Err(self.syntax_error(format!(
                "Cannot create sub reader, next token {} is not a value",
                p.kind()
            ))),
        }
    }

    /// Stop reading. Every later call fails with [`JsonError::Closed`].
    pub fn close(&mut self) {
        self.peeked = None;
        self.buffered = None;
        self.stack.clear();
        self.stack.push(Scope::Closed);
        self.path_names.truncate(1);
        self.path_indices.truncate(1);
    }

    /// JSONPath-style location of the cursor, e.g. `$.items[2].name`.
    pub fn path(&self) -> String {
        let mut path = String::from("$");
        for (i, scope) in self.stack.iter().enumerate() {
            match scope {
                Scope::EmptyArray | Scope::NonEmptyArray => {
                    let _ = write!(path, "[{}]", self.path_indices[i]);
                }
                Scope::EmptyObject | Scope::DanglingName | Scope::NonEmptyObject => {
                    path.push('.');
                    if let Some(Some(name)) = self.path_names.get(i) {
                        path.push_str(name);
                    }
                }
                Scope::EmptyDocument | Scope::NonEmptyDocument | Scope::Closed => {}
            }
        }
        path
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    /// Build a syntax error located at the cursor.
    pub fn syntax_error(&self, message: impl Into<String>) -> JsonError {
        let (line, column) = self.location(self.pos);
        JsonError::Syntax {
            message: message.into(),
            line,
            column,
            path: self.path(),
        }
    }

    fn unexpected(&self, expected: &str, p: Peeked) -> JsonError {
        self.syntax_error(format!("Expected {expected} but was {}", p.kind()))
    }

    fn invalid_number(&self, literal: &str, at: usize) -> JsonError {
        let (line, column) = self.location(at);
        JsonError::InvalidNumber {
            literal: literal.to_owned(),
            line,
            column,
            path: self.path(),
        }
    }

    fn precision_loss(&self, literal: &str, expected: &'static str, at: usize) -> JsonError {
        let (line, column) = self.location(at);
        JsonError::PrecisionLoss {
            literal: literal.to_owned(),
            expected,
            line,
            column,
            path: self.path(),
        }
    }

    /// Line and column of byte offset `at`, both 1-based.
    fn location(&self, at: usize) -> (usize, usize) {
        let at = at.min(self.src.len());
        let consumed = &self.src.as_bytes()[..at];
        let line = consumed.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = consumed
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let column = self.src[line_start..]
            .char_indices()
            .take_while(|(i, _)| line_start + i < at)
            .count()
            + 1;
        (line, column)
    }

    fn check_lenient(&self) -> Result<(), JsonError> {
        if self.lenient {
            Ok(())
        } else {
            Err(self.syntax_error(LENIENT_HINT))
        }
    }

    // ── Scope bookkeeping ────────────────────────────────────────────────────

    fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
        self.path_names.push(None);
        self.path_indices.push(0);
    }

    fn pop(&mut self) {
        // The document marker is only replaced by `close`.
        if self.stack.len() > 1 {
            self.stack.pop();
            self.path_names.pop();
            self.path_indices.pop();
        }
    }

    fn increment_index(&mut self) {
        if let Some(index) = self.path_indices.last_mut() {
            *index += 1;
        }
    }

    fn fork(&self) -> JsonReader<'a> {
        JsonReader {
            src: self.src,
            pos: self.pos,
            lenient: self.lenient,
            peeked: self.peeked,
            peeked_long: self.peeked_long,
            number_start: self.number_start,
            number_len: self.number_len,
            buffered: self.buffered.clone(),
            stack: self.stack.clone(),
            path_names: self.path_names.clone(),
            path_indices: self.path_indices.clone(),
            builder: String::new(),
        }
    }

    // ── Classification ───────────────────────────────────────────────────────

    fn peek_internal(&mut self) -> Result<Peeked, JsonError> {
        match self.peeked {
            Some(p) => Ok(p),
            None => self.do_peek(),
        }
    }

    fn set_peeked(&mut self, p: Peeked) -> Peeked {
        self.peeked = Some(p);
        p
    }

    fn do_peek(&mut self) -> Result<Peeked, JsonError> {
        let top = self.stack.len() - 1;
        let peek_stack = self.stack[top];
        match peek_stack {
            Scope::EmptyArray => self.stack[top] = Scope::NonEmptyArray,
            Scope::NonEmptyArray => match self.next_non_whitespace()? {
                b']' => return Ok(self.set_peeked(Peeked::EndArray)),
                b';' => self.check_lenient()?,
                b',' => {}
                _ => {
                    self.pos -= 1;
                    return Err(self.syntax_error("Unterminated array"));
                }
            },
            Scope::EmptyObject | Scope::NonEmptyObject => {
                self.stack[top] = Scope::DanglingName;
                if peek_stack == Scope::NonEmptyObject {
                    match self.next_non_whitespace()? {
                        b'}' => return Ok(self.set_peeked(Peeked::EndObject)),
                        b';' => self.check_lenient()?,
                        b',' => {}
                        _ => {
                            self.pos -= 1;
                            return Err(self.syntax_error("Unterminated object"));
                        }
                    }
                }
                return match self.next_non_whitespace()? {
                    b'"' => Ok(self.set_peeked(Peeked::DoubleQuotedName)),
                    b'\'' => {
                        self.pos -= 1;
                        self.check_lenient()?;
                        self.pos += 1;
                        Ok(self.set_peeked(Peeked::SingleQuotedName))
                    }
                    b'}' => {
                        // `{"a":1,}` is only tolerated in lenient mode.
                        if peek_stack == Scope::NonEmptyObject && !self.lenient {
                            self.pos -= 1;
                            Err(self.syntax_error("Expected name"))
                        } else {
                            Ok(self.set_peeked(Peeked::EndObject))
                        }
                    }
                    c => {
                        self.pos -= 1;
                        self.check_lenient()?;
                        if self.is_literal(c)? {
                            Ok(self.set_peeked(Peeked::UnquotedName))
                        } else {
                            Err(self.syntax_error("Expected name"))
                        }
                    }
                };
            }
            Scope::DanglingName => {
                self.stack[top] = Scope::NonEmptyObject;
                match self.next_non_whitespace()? {
                    b':' => {}
                    b'=' => {
                        self.check_lenient()?;
                        if self.src.as_bytes().get(self.pos) == Some(&b'>') {
                            self.pos += 1;
                        }
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.syntax_error("Expected ':'"));
                    }
                }
            }
            Scope::EmptyDocument => {
                if self.lenient {
                    self.consume_non_execute_prefix()?;
                }
                self.stack[top] = Scope::NonEmptyDocument;
            }
            Scope::NonEmptyDocument => match self.next_non_whitespace_opt()? {
                None => return Ok(self.set_peeked(Peeked::Eof)),
                Some(_) => {
                    self.pos -= 1;
                    self.check_lenient()?;
                }
            },
            Scope::Closed => return Err(JsonError::Closed),
        }

        match self.next_non_whitespace()? {
            b']' if peek_stack == Scope::EmptyArray => {
                return Ok(self.set_peeked(Peeked::EndArray));
            }
            b']' | b';' | b',' => {
                self.pos -= 1;
                // A missing element inside an array reads as null in lenient mode.
                if matches!(peek_stack, Scope::EmptyArray | Scope::NonEmptyArray) {
                    self.check_lenient()?;
                    return Ok(self.set_peeked(Peeked::Null));
                }
                return Err(self.syntax_error("Unexpected value"));
            }
            b'\'' => {
                self.pos -= 1;
                self.check_lenient()?;
                self.pos += 1;
                return Ok(self.set_peeked(Peeked::SingleQuoted));
            }
            b'"' => return Ok(self.set_peeked(Peeked::DoubleQuoted)),
            b'[' => return Ok(self.set_peeked(Peeked::BeginArray)),
            b'{' => return Ok(self.set_peeked(Peeked::BeginObject)),
            _ => self.pos -= 1,
        }

        if let Some(p) = self.peek_keyword()? {
            return Ok(self.set_peeked(p));
        }
        if let Some(p) = self.peek_number()? {
            return Ok(self.set_peeked(p));
        }
        let c = self.src.as_bytes()[self.pos];
        if !self.is_literal(c)? {
            return Err(self.syntax_error("Expected value"));
        }
        self.check_lenient()?;
        Ok(self.set_peeked(Peeked::Unquoted))
    }

    fn peek_keyword(&mut self) -> Result<Option<Peeked>, JsonError> {
        let rest = &self.src.as_bytes()[self.pos..];
        let (keyword, peeked): (&[u8], Peeked) = match rest.first() {
            Some(b't' | b'T') => (b"true", Peeked::True),
            Some(b'f' | b'F') => (b"false", Peeked::False),
            Some(b'n' | b'N') => (b"null", Peeked::Null),
            _ => return Ok(None),
        };
        let Some(candidate) = rest.get(..keyword.len()) else {
            return Ok(None);
        };
        let matches = if self.lenient {
            candidate.eq_ignore_ascii_case(keyword)
        } else {
            candidate == keyword
        };
        if !matches {
            return Ok(None);
        }
        if let Some(&next) = rest.get(keyword.len()) {
            let saved = self.pos;
            self.pos += keyword.len();
            let literal = self.is_literal(next);
            self.pos = saved;
            if literal? {
                return Ok(None);
            }
        }
        self.pos += keyword.len();
        Ok(Some(peeked))
    }

    /// Classify a numeric literal at the cursor without consuming it.
    ///
    /// Digits are accumulated into a negated `i64` (so `i64::MIN` fits) while
    /// tracking overflow; integral literals that fit become `Peeked::Long`.
    fn peek_number(&mut self) -> Result<Option<Peeked>, JsonError> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let mut value: i64 = 0;
        let mut negative = false;
        let mut fits_in_long = true;
        let mut last = NumberChar::None;
        let mut i = 0;

        while let Some(&c) = bytes.get(start + i) {
            match c {
                b'-' => match last {
                    NumberChar::None => {
                        negative = true;
                        last = NumberChar::Sign;
                    }
                    NumberChar::ExpE => last = NumberChar::ExpSign,
                    _ => return Ok(None),
                },
                b'+' => {
                    if last != NumberChar::ExpE {
                        return Ok(None);
                    }
                    last = NumberChar::ExpSign;
                }
                b'e' | b'E' => {
                    if !matches!(last, NumberChar::Digit | NumberChar::FractionDigit) {
                        return Ok(None);
                    }
                    last = NumberChar::ExpE;
                }
                b'.' => {
                    if last != NumberChar::Digit {
                        return Ok(None);
                    }
                    last = NumberChar::Decimal;
                }
                b'0'..=b'9' => {
                    let digit = i64::from(c - b'0');
                    match last {
                        NumberChar::None | NumberChar::Sign => {
                            value = -digit;
                            last = NumberChar::Digit;
                        }
                        NumberChar::Digit => {
                            if value == 0 {
                                // Leading zeros are not JSON.
                                return Ok(None);
                            }
                            match value.checked_mul(10).and_then(|v| v.checked_sub(digit)) {
                                Some(next) => value = next,
                                None => fits_in_long = false,
                            }
                        }
                        NumberChar::Decimal => last = NumberChar::FractionDigit,
                        NumberChar::ExpE | NumberChar::ExpSign => last = NumberChar::ExpDigit,
                        NumberChar::FractionDigit | NumberChar::ExpDigit => {}
                    }
                }
                _ => {
                    if self.is_literal(c)? {
                        return Ok(None);
                    }
                    break;
                }
            }
            i += 1;
        }

        if last == NumberChar::Digit
            && fits_in_long
            && (value != i64::MIN || negative)
            && (value != 0 || !negative)
        {
            self.peeked_long = if negative { value } else { -value };
            self.number_start = start;
            self.number_len = i;
            Ok(Some(Peeked::Long))
        } else if matches!(
            last,
            NumberChar::Digit | NumberChar::FractionDigit | NumberChar::ExpDigit
        ) {
            self.number_start = start;
            self.number_len = i;
            Ok(Some(Peeked::Number))
        } else {
            Ok(None)
        }
    }

    /// Whether `c` may continue an unquoted literal.
    fn is_literal(&self, c: u8) -> Result<bool, JsonError> {
        match c {
            b'/' | b'\\' | b';' | b'#' | b'=' => {
                self.check_lenient()?;
                Ok(false)
            }
            _ => Ok(is_literal_char(c)),
        }
    }

    // ── Scanning ─────────────────────────────────────────────────────────────

    /// Next significant byte, skipping whitespace and (lenient) comments.
    fn next_non_whitespace_opt(&mut self) -> Result<Option<u8>, JsonError> {
        let bytes = self.src.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            self.pos += 1;
            match c {
                b' ' | b'\n' | b'\t' | b'\r' => {}
                b'/' => {
                    let Some(&next) = bytes.get(self.pos) else {
                        return Ok(Some(c));
                    };
                    self.pos -= 1;
                    self.check_lenient()?;
                    self.pos += 1;
                    match next {
                        b'*' => {
                            self.pos += 1;
                            match bytes[self.pos..].windows(2).position(|w| w == b"*/") {
                                Some(offset) => self.pos += offset + 2,
                                None => return Err(self.syntax_error("Unterminated comment")),
                            }
                        }
                        b'/' => {
                            self.pos += 1;
                            self.skip_to_end_of_line();
                        }
                        _ => return Ok(Some(c)),
                    }
                }
                b'#' => {
                    self.pos -= 1;
                    self.check_lenient()?;
                    self.pos += 1;
                    self.skip_to_end_of_line();
                }
                _ => return Ok(Some(c)),
            }
        }
        Ok(None)
    }

    fn next_non_whitespace(&mut self) -> Result<u8, JsonError> {
        match self.next_non_whitespace_opt()? {
            Some(c) => Ok(c),
            None => Err(self.syntax_error("End of input")),
        }
    }

    fn skip_to_end_of_line(&mut self) {
        let bytes = self.src.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            self.pos += 1;
            if c == b'\n' || c == b'\r' {
                break;
            }
        }
    }

    fn consume_non_execute_prefix(&mut self) -> Result<(), JsonError> {
        if self.next_non_whitespace_opt()?.is_none() {
            return Ok(());
        }
        self.pos -= 1;
        if self.src.as_bytes()[self.pos..].starts_with(NON_EXECUTE_PREFIX) {
            self.pos += NON_EXECUTE_PREFIX.len();
        }
        Ok(())
    }

    /// Read a quoted string; the opening quote has been consumed.
    fn next_quoted_value(&mut self, quote: u8) -> Result<Cow<'a, str>, JsonError> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let mut p = start;
        while let Some(&c) = bytes.get(p) {
            if c == quote {
                self.pos = p + 1;
                return Ok(Cow::Borrowed(&self.src[start..p]));
            }
            if c == b'\\' {
                // First escape: copy what was scanned and continue in the builder.
                self.builder.clear();
                self.builder.push_str(&self.src[start..p]);
                self.pos = p;
                return self.next_quoted_value_escaped(quote).map(Cow::Owned);
            }
            p += 1;
        }
        self.pos = p;
        Err(self.syntax_error("Unterminated string"))
    }

    fn next_quoted_value_escaped(&mut self, quote: u8) -> Result<String, JsonError> {
        let bytes = self.src.as_bytes();
        loop {
            let run_start = self.pos;
            while let Some(&c) = bytes.get(self.pos) {
                if c == quote || c == b'\\' {
                    break;
                }
                self.pos += 1;
            }
            self.builder.push_str(&self.src[run_start..self.pos]);
            match bytes.get(self.pos) {
                None => return Err(self.syntax_error("Unterminated string")),
                Some(&c) if c == quote => {
                    self.pos += 1;
                    return Ok(self.builder.clone());
                }
                Some(_) => {
                    self.pos += 1;
                    let ch = self.read_escape_character()?;
                    self.builder.push(ch);
                }
            }
        }
    }

    fn skip_quoted_value(&mut self, quote: u8) -> Result<(), JsonError> {
        let bytes = self.src.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            self.pos += 1;
            if c == quote {
                return Ok(());
            }
            if c == b'\\' {
                self.read_escape_character()?;
            }
        }
        Err(self.syntax_error("Unterminated string"))
    }

    /// Decode the escape sequence following a backslash.
    fn read_escape_character(&mut self) -> Result<char, JsonError> {
        let Some(&escaped) = self.src.as_bytes().get(self.pos) else {
            return Err(self.syntax_error("Unterminated escape sequence"));
        };
        self.pos += 1;
        let ch = match escaped {
            b'u' => return self.read_unicode_escape(),
            b't' => '\t',
            b'b' => '\u{8}',
            b'n' => '\n',
            b'r' => '\r',
            b'f' => '\u{c}',
            b'\n' => '\n',
            b'\'' | b'"' | b'\\' | b'/' => char::from(escaped),
            _ => {
                self.pos -= 1;
                return Err(self.syntax_error("Invalid escape sequence"));
            }
        };
        Ok(ch)
    }

    fn read_unicode_escape(&mut self) -> Result<char, JsonError> {
        let unit = self.read_hex4()?;
        if !(0xD800..0xDC00).contains(&unit) {
            return Ok(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        // High surrogate: combine with a following low surrogate escape.
        let bytes = self.src.as_bytes();
        if bytes.get(self.pos) == Some(&b'\\') && bytes.get(self.pos + 1) == Some(&b'u') {
            let saved = self.pos;
            self.pos += 2;
            let low = self.read_hex4()?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            self.pos = saved;
        }
        Ok(char::REPLACEMENT_CHARACTER)
    }

    fn read_hex4(&mut self) -> Result<u32, JsonError> {
        let Some(digits) = self.src.as_bytes().get(self.pos..self.pos + 4) else {
            return Err(self.syntax_error("Unterminated escape sequence"));
        };
        let mut value = 0u32;
        for &d in digits {
            let nibble = match d {
                b'0'..=b'9' => d - b'0',
                b'a'..=b'f' => d - b'a' + 10,
                b'A'..=b'F' => d - b'A' + 10,
                _ => return Err(self.syntax_error("Malformed unicode escape")),
            };
            value = (value << 4) | u32::from(nibble);
        }
        self.pos += 4;
        Ok(value)
    }

    fn next_unquoted_value(&mut self) -> Cow<'a, str> {
        let start = self.pos;
        self.skip_unquoted_value();
        Cow::Borrowed(&self.src[start..self.pos])
    }

    fn skip_unquoted_value(&mut self) {
        let bytes = self.src.as_bytes();
        while let Some(&c) = bytes.get(self.pos) {
            if !is_literal_char(c) || matches!(c, b'/' | b'\\' | b';' | b'#' | b'=') {
                break;
            }
            self.pos += 1;
        }
    }

    // ── Numbers ──────────────────────────────────────────────────────────────

    fn number_literal(&self) -> &'a str {
        let src: &'a str = self.src;
        &src[self.number_start..self.number_start + self.number_len]
    }

    fn consume_number_literal(&mut self) -> &'a str {
        let literal = self.number_literal();
        self.pos = self.number_start + self.number_len;
        literal
    }

    /// Read a string token into the buffered slot and return its text.
    ///
    /// The value stays buffered so a failed numeric conversion can be retried
    /// with [`next_string`](Self::next_string).
    fn buffer_string(&mut self) -> Result<Cow<'a, str>, JsonError> {
        let value = match self.peek_internal()? {
            Peeked::Buffered => return Ok(self.buffered.clone().unwrap_or_default()),
            Peeked::SingleQuoted => self.next_quoted_value(b'\'')?,
            Peeked::DoubleQuoted => self.next_quoted_value(b'"')?,
            Peeked::Unquoted => self.next_unquoted_value(),
            p => return Err(self.unexpected("a string", p)),
        };
        self.buffered = Some(value.clone());
        self.peeked = Some(Peeked::Buffered);
        Ok(value)
    }

    fn parse_exact_long(&self, literal: &str, at: usize, expected: &'static str) -> Result<i64, JsonError> {
        if let Ok(value) = literal.parse::<i64>() {
            return Ok(value);
        }
        match exact_integer(literal) {
            ExactInteger::Value(value) => Ok(value),
            ExactInteger::Inexact => Err(self.precision_loss(literal, expected, at)),
            ExactInteger::NotANumber => Err(self.invalid_number(literal, at)),
        }
    }
}

/// Outcome of reading a decimal literal as an exact integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExactInteger {
    Value(i64),
    /// A number, but fractional or outside the `i64` range.
    Inexact,
    NotANumber,
}

/// Evaluate `literal` in decimal arithmetic, never through `f64`.
fn exact_integer(literal: &str) -> ExactInteger {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let (mantissa, exponent) = match literal.find(|c: char| c == 'e' || c == 'E') {
        Some(i) => (&literal[..i], Some(&literal[i + 1..])),
        None => (literal, None),
    };
    let (negative, unsigned) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
        return ExactInteger::NotANumber;
    }

    // Saturated so that absurd exponents still classify as out of range.
    const EXPONENT_LIMIT: i64 = 1 << 40;
    let mut scale = match exponent {
        None => 0,
        Some(e) => {
            let (exp_negative, digits) = match e.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, e.strip_prefix('+').unwrap_or(e)),
            };
            if digits.is_empty() || !all_digits(digits) {
                return ExactInteger::NotANumber;
            }
            let magnitude = digits.parse::<i64>().unwrap_or(EXPONENT_LIMIT).min(EXPONENT_LIMIT);
            if exp_negative {
                -magnitude
            } else {
                magnitude
            }
        }
    };
    scale -= frac_part.len() as i64;

    let joined = format!("{int_part}{frac_part}");
    let significant = joined.trim_start_matches('0');
    if significant.is_empty() {
        return ExactInteger::Value(0);
    }
    let trimmed = significant.trim_end_matches('0');
    scale += (significant.len() - trimmed.len()) as i64;
    if scale < 0 || trimmed.len() as i64 + scale > 19 {
        return ExactInteger::Inexact;
    }

    let Ok(mut value) = trimmed.parse::<i128>() else {
        return ExactInteger::Inexact;
    };
    value *= 10i128.pow(scale as u32);
    if negative {
        value = -value;
    }
    match i64::try_from(value) {
        Ok(value) => ExactInteger::Value(value),
        Err(_) => ExactInteger::Inexact,
    }
}

/// Bytes that may appear inside an unquoted literal.
fn is_literal_char(c: u8) -> bool {
    !matches!(
        c,
        b'/' | b'\\'
            | b';'
            | b'#'
            | b'='
            | b'{'
            | b'}'
            | b'['
            | b']'
            | b':'
            | b','
            | b' '
            | b'\t'
            | b'\x0c'
            | b'\r'
            | b'\n'
    )
}
