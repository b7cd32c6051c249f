//! Growable byte buffer with read and write cursors.

use bytes::{Buf, Bytes, BytesMut};

/// An owned, growable byte buffer.
///
/// Bytes are appended at the write cursor and consumed from the read cursor.
/// Consumed units are handed out as [`Bytes`] views sharing the underlying
/// allocation, so splitting never copies.
#[derive(Debug, Default)]
pub struct ByteCursor {
    buf: BytesMut,
    /// Total bytes consumed since creation.
    read_index: u64,
    /// Total bytes appended since creation.
    write_index: u64,
}

impl ByteCursor {
    /// Create an empty cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cursor able to hold `capacity` bytes without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Append a slice at the write cursor.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.write_index += data.len() as u64;
    }

    /// Number of readable bytes between the read and write cursors.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current allocated capacity.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Borrow the readable bytes.
    pub fn readable(&self) -> &[u8] {
        &self.buf
    }

    /// Borrow at most `n` readable bytes without consuming them.
    pub fn peek(&self, n: usize) -> &[u8] {
        &self.buf[..n.min(self.buf.len())]
    }

    /// Discard `n` readable bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`len`](Self::len).
    pub fn advance(&mut self, n: usize) {
        self.buf.advance(n);
        self.read_index += n as u64;
    }

    /// Split the first `n` readable bytes off as an immutable view.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`len`](Self::len).
    pub fn split_to(&mut self, n: usize) -> Bytes {
        self.read_index += n as u64;
        self.buf.split_to(n).freeze()
    }

    /// Take every readable byte, leaving the cursor empty.
    pub fn take_all(&mut self) -> Bytes {
        let n = self.buf.len();
        self.split_to(n)
    }

    /// Reclaim space held by consumed bytes.
    ///
    /// When nothing is readable the buffer is reset in place; otherwise the
    /// readable tail is copied into a right-sized allocation.
    pub fn compact(&mut self) {
        if self.buf.is_empty() {
            self.buf.clear();
            return;
        }
        let mut tail = BytesMut::with_capacity(self.buf.len());
        tail.extend_from_slice(&self.buf);
        self.buf = tail;
    }

    /// Drop all data and the allocation.
    pub fn clear(&mut self) {
        let pending = self.buf.len() as u64;
        self.read_index += pending;
        self.buf = BytesMut::new();
    }

    /// Total bytes consumed since creation.
    pub fn read_index(&self) -> u64 {
        self.read_index
    }

    /// Total bytes appended since creation.
    pub fn write_index(&self) -> u64 {
        self.write_index
    }
}
