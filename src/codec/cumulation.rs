//! Cumulation buffer shared by the frame decoders and the protocol sniffer's
//! dispatch loop.

use bytes::{Bytes, BytesMut};

use crate::buffer::ByteCursor;

/// Bytes retained between two reads.
#[derive(Debug, Default)]
pub enum PendingBuffer {
    /// Nothing retained.
    #[default]
    Empty,
    /// One retained chunk, still the caller's allocation (never copied).
    Single(Bytes),
    /// Owned concatenation of several fragments.
    Composite(ByteCursor),
}

impl PendingBuffer {
    fn len(&self) -> usize {
        match self {
            PendingBuffer::Empty => 0,
            PendingBuffer::Single(bytes) => bytes.len(),
            PendingBuffer::Composite(cursor) => cursor.len(),
        }
    }
}

/// Accumulates chunks until a requested number of bytes is available.
///
/// The readable length is always the sum of appended bytes minus the bytes
/// handed out by [`take`](Self::take).
#[derive(Debug, Default)]
pub struct Cumulation {
    pending: PendingBuffer,
}

impl Cumulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained bytes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether fragments have been merged into an owned buffer.
    pub fn is_composite(&self) -> bool {
        matches!(self.pending, PendingBuffer::Composite(_))
    }

    /// Current representation of the retained bytes.
    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    /// Contiguous view of every retained byte.
    pub fn readable(&self) -> &[u8] {
        match &self.pending {
            PendingBuffer::Empty => &[],
            PendingBuffer::Single(bytes) => bytes,
            PendingBuffer::Composite(cursor) => cursor.readable(),
        }
    }

    /// Retain `chunk` without asking for any output.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.pending = match std::mem::take(&mut self.pending) {
            PendingBuffer::Empty => PendingBuffer::Single(chunk),
            PendingBuffer::Single(held) => PendingBuffer::Composite(concat(&held, &chunk, 0)),
            PendingBuffer::Composite(mut cursor) => {
                cursor.append(&chunk);
                PendingBuffer::Composite(cursor)
            }
        };
    }

    /// Add `chunk` (if any) and split off exactly `required` bytes once available.
    ///
    /// Returns `None` while the retained bytes fall short; `chunk` is then kept
    /// for the next call. Bytes beyond `required` stay retained.
    pub fn take(&mut self, chunk: Option<Bytes>, required: usize) -> Option<Bytes> {
        let chunk = chunk.filter(|c| !c.is_empty());
        match std::mem::take(&mut self.pending) {
            PendingBuffer::Empty => {
                let Some(mut chunk) = chunk else {
                    return (required == 0).then(Bytes::new);
                };
                if chunk.len() >= required {
                    let frame = chunk.split_to(required);
                    self.retain_single(chunk);
                    Some(frame)
                } else {
                    self.pending = PendingBuffer::Single(chunk);
                    None
                }
            }
            PendingBuffer::Single(mut held) => {
                if held.len() >= required {
                    let frame = held.split_to(required);
                    self.retain_single(held);
                    if let Some(chunk) = chunk {
                        self.push(chunk);
                    }
                    return Some(frame);
                }
                let Some(chunk) = chunk else {
                    self.pending = PendingBuffer::Single(held);
                    return None;
                };
                let needed = required - held.len();
                if chunk.len() < needed {
                    self.pending = PendingBuffer::Composite(concat(&held, &chunk, required));
                    return None;
                }
                let mut frame = BytesMut::with_capacity(required);
                frame.extend_from_slice(&held);
                frame.extend_from_slice(&chunk[..needed]);
                self.retain_single(chunk.slice(needed..));
                Some(frame.freeze())
            }
            PendingBuffer::Composite(mut cursor) => {
                if cursor.len() >= required {
                    let frame = cursor.split_to(required);
                    if let Some(chunk) = chunk {
                        cursor.append(&chunk);
                    }
                    if !cursor.is_empty() {
                        self.pending = PendingBuffer::Composite(cursor);
                    }
                    return Some(frame);
                }
                let Some(chunk) = chunk else {
                    self.pending = PendingBuffer::Composite(cursor);
                    return None;
                };
                let needed = required - cursor.len();
                if chunk.len() < needed {
                    cursor.append(&chunk);
                    self.pending = PendingBuffer::Composite(cursor);
                    return None;
                }
                cursor.append(&chunk[..needed]);
                // The composite is fully drained into the frame and dropped.
                let frame = cursor.take_all();
                self.retain_single(chunk.slice(needed..));
                Some(frame)
            }
        }
    }

    /// Split off up to `max` retained bytes, or `None` when nothing is retained.
    pub fn take_up_to(&mut self, max: usize) -> Option<Bytes> {
        let n = self.len().min(max);
        if n == 0 {
            return None;
        }
        self.take(None, n)
    }

    /// Hand out every retained byte.
    pub fn take_all(&mut self) -> Bytes {
        match std::mem::take(&mut self.pending) {
            PendingBuffer::Empty => Bytes::new(),
            PendingBuffer::Single(bytes) => bytes,
            PendingBuffer::Composite(mut cursor) => cursor.take_all(),
        }
    }

    /// Drop retained bytes. Returns how many were discarded; safe to repeat.
    pub fn release(&mut self) -> usize {
        let discarded = self.len();
        self.pending = PendingBuffer::Empty;
        discarded
    }

    fn retain_single(&mut self, rest: Bytes) {
        if !rest.is_empty() {
            self.pending = PendingBuffer::Single(rest);
        }
    }
}

fn concat(first: &[u8], second: &[u8], capacity_hint: usize) -> ByteCursor {
    let mut cursor = ByteCursor::with_capacity(capacity_hint.max(first.len() + second.len()));
    cursor.append(first);
    cursor.append(second);
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sufficient_chunk_is_sliced_without_copy() {
        let mut cumulation = Cumulation::new();
        let chunk = Bytes::from_static(b"Hello, world");
        let frame = cumulation.take(Some(chunk.clone()), 5).unwrap();

        assert_eq!(&frame[..], b"Hello");
        // Same backing memory as the input chunk.
        assert_eq!(frame.as_ptr(), chunk.as_ptr());
        assert!(matches!(cumulation.pending(), PendingBuffer::Single(_)));
        assert_eq!(cumulation.readable(), b", world");
    }

    #[test]
    fn short_chunk_is_retained_as_single() {
        let mut cumulation = Cumulation::new();
        assert!(cumulation.take(Some(Bytes::from_static(b"He")), 5).is_none());
        assert!(matches!(cumulation.pending(), PendingBuffer::Single(_)));
        assert!(!cumulation.is_composite());
    }

    #[test]
    fn second_short_fragment_promotes_to_composite() {
        let mut cumulation = Cumulation::new();
        assert!(cumulation.take(Some(Bytes::from_static(b"H")), 5).is_none());
        assert!(cumulation.take(Some(Bytes::from_static(b"e")), 5).is_none());
        assert!(cumulation.is_composite());
        assert_eq!(cumulation.readable(), b"He");

        let frame = cumulation.take(Some(Bytes::from_static(b"llo!!")), 5).unwrap();
        assert_eq!(&frame[..], b"Hello");
        assert!(!cumulation.is_composite());
        assert_eq!(cumulation.readable(), b"!!");
    }

    #[test]
    fn exact_completion_clears_everything() {
        let mut cumulation = Cumulation::new();
        assert!(cumulation.take(Some(Bytes::from_static(b"He")), 5).is_none());
        let frame = cumulation.take(Some(Bytes::from_static(b"llo")), 5).unwrap();
        assert_eq!(&frame[..], b"Hello");
        assert!(cumulation.is_empty());
        assert!(matches!(cumulation.pending(), PendingBuffer::Empty));
    }

    #[test]
    fn surplus_serves_next_request_without_new_chunk() {
        let mut cumulation = Cumulation::new();
        let frame = cumulation.take(Some(Bytes::from_static(b"abcdef")), 2).unwrap();
        assert_eq!(&frame[..], b"ab");
        assert_eq!(&cumulation.take(None, 3).unwrap()[..], b"cde");
        assert!(cumulation.take(None, 2).is_none());
        assert_eq!(cumulation.len(), 1);
    }

    #[test]
    fn push_and_take_all() {
        let mut cumulation = Cumulation::new();
        cumulation.push(Bytes::from_static(b"ab"));
        cumulation.push(Bytes::new());
        cumulation.push(Bytes::from_static(b"cd"));
        assert!(cumulation.is_composite());
        assert_eq!(&cumulation.take_all()[..], b"abcd");
        assert!(cumulation.is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let mut cumulation = Cumulation::new();
        cumulation.push(Bytes::from_static(b"partial"));
        assert_eq!(cumulation.release(), 7);
        assert_eq!(cumulation.release(), 0);
        assert!(cumulation.is_empty());
    }

    #[test]
    fn take_up_to_limits_length() {
        let mut cumulation = Cumulation::new();
        assert!(cumulation.take_up_to(4).is_none());
        cumulation.push(Bytes::from_static(b"xy"));
        assert_eq!(&cumulation.take_up_to(4).unwrap()[..], b"xy");
    }
}
