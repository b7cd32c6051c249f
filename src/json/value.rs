//! Materialising reader values as `serde_json::Value` trees.

use serde_json::{Map, Number, Value};

use super::error::JsonError;
use super::reader::JsonReader;
use super::token::{JsonNumber, TokenKind};

/// Container under construction.
enum Frame {
    Array(Vec<Value>),
    Object(Map<String, Value>, Option<String>),
}

impl<'a> JsonReader<'a> {
    /// Read the next value, including nested containers, into a [`Value`].
    ///
    /// Containers are built on an explicit stack so deeply nested input does
    /// not grow the call stack.
    pub fn read_value(&mut self) -> Result<Value, JsonError> {
        let mut frames: Vec<Frame> = Vec::new();
        loop {
            let in_array = frames.last().map(|f| matches!(f, Frame::Array(_)));
            let finished = match in_array {
                Some(_) => !self.has_next()?,
                None => false,
            };
            let value = match in_array {
                Some(in_array) if finished => {
                    if in_array {
                        self.end_array()?;
                    } else {
                        self.end_object()?;
                    }
                    match frames.pop() {
                        Some(Frame::Array(items)) => Value::Array(items),
                        Some(Frame::Object(map, _)) => Value::Object(map),
                        None => return Err(self.syntax_error("Unbalanced container")),
                    }
                }
                _ => {
                    if let Some(Frame::Object(_, key)) = frames.last_mut() {
                        *key = Some(self.next_name()?.into_owned());
                    }
                    match self.open_or_scalar(&mut frames)? {
                        Some(value) => value,
                        None => continue,
                    }
                }
            };

            match frames.last_mut() {
                None => return Ok(value),
                Some(Frame::Array(items)) => items.push(value),
                Some(Frame::Object(map, key)) => {
                    if let Some(key) = key.take() {
                        map.insert(key, value);
                    }
                }
            }
        }
    }

    /// Read a scalar, or open a container and return `None`.
    fn open_or_scalar(&mut self, frames: &mut Vec<Frame>) -> Result<Option<Value>, JsonError> {
        let value = match self.peek()? {
            TokenKind::BeginArray => {
                self.begin_array()?;
                frames.push(Frame::Array(Vec::new()));
                return Ok(None);
            }
            TokenKind::BeginObject => {
                self.begin_object()?;
                frames.push(Frame::Object(Map::new(), None));
                return Ok(None);
            }
            TokenKind::String => Value::String(self.next_string()?.into_owned()),
            TokenKind::Number => self.number_value()?,
            TokenKind::Boolean => Value::Bool(self.next_boolean()?),
            TokenKind::Null => {
                self.next_null()?;
                Value::Null
            }
            other => return Err(self.syntax_error(format!("Expected a value but was {other}"))),
        };
        Ok(Some(value))
    }

    fn number_value(&mut self) -> Result<Value, JsonError> {
        match self.next_number()? {
            JsonNumber::Long(v) => Ok(Value::from(v)),
            JsonNumber::Double(v) => Number::from_f64(v)
                .map(Value::Number)
                .ok_or_else(|| self.syntax_error(format!("Cannot represent {v} as a JSON value"))),
        }
    }
}
