//! Text messages decoded from UTF-8 chunks.

use bytes::Bytes;

use super::{Cumulation, DecodeError};

/// Decodes a message body of known byte length into characters as chunks arrive.
///
/// The character buffer is reused across messages; its capacity is reserved
/// once per message from the declared content length.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    pending: Cumulation,
    chars: String,
    /// Leading bytes of a code point split across two chunks.
    carry: [u8; 4],
    carry_len: usize,
    /// Bytes of the current message already decoded.
    consumed: usize,
    /// The last call returned a complete message.
    delivered: bool,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain a chunk of the message stream.
    pub fn feed(&mut self, chunk: Bytes) {
        self.pending.push(chunk);
    }

    /// Decode buffered bytes until `required_byte_count` bytes of the current
    /// message have been seen.
    ///
    /// Returns `None` while bytes are missing. Once complete the whole message
    /// text is returned; the next call starts a new message and any surplus
    /// bytes already fed belong to it.
    pub fn read_chars(&mut self, required_byte_count: usize) -> Result<Option<&str>, DecodeError> {
        if self.delivered {
            self.start_message();
        }
        if self.consumed == 0 && self.chars.capacity() < required_byte_count {
            self.chars.reserve(required_byte_count - self.chars.len());
        }

        while self.consumed < required_byte_count {
            let Some(part) = self.pending.take_up_to(required_byte_count - self.consumed) else {
                break;
            };
            self.decode(&part)?;
            self.consumed += part.len();
        }

        if self.consumed < required_byte_count {
            return Ok(None);
        }
        if self.carry_len > 0 {
            return Err(DecodeError::InvalidUtf8 {
                offset: self.consumed - self.carry_len,
            });
        }
        self.delivered = true;
        Ok(Some(&self.chars))
    }

    /// Bytes fed but not yet decoded.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Capacity of the reusable character buffer.
    pub fn char_capacity(&self) -> usize {
        self.chars.capacity()
    }

    /// Drop buffered bytes and the character buffer. Safe to call repeatedly.
    pub fn release(&mut self) {
        let discarded = self.pending.release() + self.consumed;
        if discarded > 0 && !self.delivered {
            tracing::trace!(discarded, "Discarding partially received text message");
        }
        self.chars = String::new();
        self.carry_len = 0;
        self.consumed = 0;
        self.delivered = false;
    }

    fn start_message(&mut self) {
        self.chars.clear();
        self.carry_len = 0;
        self.consumed = 0;
        self.delivered = false;
    }

    fn decode(&mut self, part: &[u8]) -> Result<(), DecodeError> {
        let mut input = part;
        if self.carry_len > 0 {
            let width = utf8_width(self.carry[0]);
            let take = (width - self.carry_len).min(input.len());
            self.carry[self.carry_len..self.carry_len + take].copy_from_slice(&input[..take]);
            self.carry_len += take;
            input = &part[take..];
            if self.carry_len < width {
                return Ok(());
            }
            let start = self.consumed - (self.carry_len - take);
            let ch = std::str::from_utf8(&self.carry[..width])
                .map_err(|_| DecodeError::InvalidUtf8 { offset: start })?;
            self.chars.push_str(ch);
            self.carry_len = 0;
        }

        match std::str::from_utf8(input) {
            Ok(text) => self.chars.push_str(text),
            Err(e) => {
                let valid = e.valid_up_to();
                let (head, tail) = input.split_at(valid);
                // `valid_up_to` guarantees `head` is well-formed.
                self.chars.push_str(std::str::from_utf8(head).unwrap_or_default());
                if e.error_len().is_some() {
                    let offset = self.consumed + (part.len() - input.len()) + valid;
                    return Err(DecodeError::InvalidUtf8 { offset });
                }
                self.carry[..tail.len()].copy_from_slice(tail);
                self.carry_len = tail.len();
            }
        }
        Ok(())
    }
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_message_in_one_chunk() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(decoder.read_chars(7).unwrap(), Some("{\"a\":1}"));
    }

    #[test]
    fn waits_for_missing_bytes() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(b"Hel"));
        assert_eq!(decoder.read_chars(5).unwrap(), None);
        decoder.feed(Bytes::from_static(b"lo"));
        assert_eq!(decoder.read_chars(5).unwrap(), Some("Hello"));
    }

    #[test]
    fn code_point_split_across_chunks() {
        let text = "héllo €";
        let bytes = text.as_bytes();
        let mut decoder = MessageDecoder::new();
        let mut result = None;
        for b in bytes {
            decoder.feed(Bytes::copy_from_slice(&[*b]));
            if let Some(s) = decoder.read_chars(bytes.len()).unwrap() {
                result = Some(s.to_owned());
            }
        }
        assert_eq!(result.as_deref(), Some(text));
    }

    #[test]
    fn surplus_starts_next_message_and_buffer_is_reused() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(b"firstsecond"));
        assert_eq!(decoder.read_chars(5).unwrap(), Some("first"));
        let capacity = decoder.char_capacity();
        assert_eq!(decoder.read_chars(6).unwrap(), Some("second"));
        assert!(decoder.char_capacity() >= capacity);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn char_buffer_sized_from_content_length() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(b"ab"));
        assert_eq!(decoder.read_chars(64).unwrap(), None);
        assert!(decoder.char_capacity() >= 64);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(&[b'a', 0xFF, b'b']));
        assert_eq!(
            decoder.read_chars(3).unwrap_err(),
            DecodeError::InvalidUtf8 { offset: 1 }
        );
    }

    #[test]
    fn truncated_code_point_at_message_end_is_invalid() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(&[b'a', 0xE2, 0x82]));
        assert_eq!(
            decoder.read_chars(3).unwrap_err(),
            DecodeError::InvalidUtf8 { offset: 1 }
        );
    }

    #[test]
    fn release_forgets_partial_message() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(Bytes::from_static(b"par"));
        assert_eq!(decoder.read_chars(10).unwrap(), None);
        decoder.release();
        decoder.release();
        decoder.feed(Bytes::from_static(b"ok"));
        assert_eq!(decoder.read_chars(2).unwrap(), Some("ok"));
    }
}
