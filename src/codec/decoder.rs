//! Frame reassembly over the cumulation buffer.

use std::num::NonZeroUsize;

use bytes::{Buf, Bytes};

use super::{Cumulation, DecodeError};

/// Framing strategy driven by [`IncrementalDecoder`].
///
/// The decoder asks how many bytes the next step needs, waits until exactly
/// that many are available, then hands them over. A strategy may need several
/// steps (header, then body) before it yields an item.
pub trait FrameDecoder {
    type Item;

    /// Bytes required for the next step.
    fn required_len(&self) -> usize;

    /// Consume exactly [`required_len`](Self::required_len) bytes.
    fn decode_frame(&mut self, frame: Bytes) -> Result<Option<Self::Item>, DecodeError>;

    /// Forget any partially decoded state.
    fn reset(&mut self) {}
}

/// Frames of a constant size.
#[derive(Debug, Clone, Copy)]
pub struct FixedLength {
    len: NonZeroUsize,
}

impl FixedLength {
    pub fn new(len: NonZeroUsize) -> Self {
        Self { len }
    }
}

impl FrameDecoder for FixedLength {
    type Item = Bytes;

    fn required_len(&self) -> usize {
        self.len.get()
    }

    fn decode_frame(&mut self, frame: Bytes) -> Result<Option<Bytes>, DecodeError> {
        Ok(Some(frame))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixState {
    Header,
    Body(usize),
}

/// Frames preceded by a 4-byte big-endian length.
#[derive(Debug, Clone)]
pub struct LengthPrefixed {
    state: PrefixState,
    max_frame_len: usize,
}

impl LengthPrefixed {
    pub const HEADER_LEN: usize = 4;

    pub fn new(max_frame_len: usize) -> Self {
        Self {
            state: PrefixState::Header,
            max_frame_len,
        }
    }
}

impl FrameDecoder for LengthPrefixed {
    type Item = Bytes;

    fn required_len(&self) -> usize {
        match self.state {
            PrefixState::Header => Self::HEADER_LEN,
            PrefixState::Body(len) => len,
        }
    }

    fn decode_frame(&mut self, mut frame: Bytes) -> Result<Option<Bytes>, DecodeError> {
        match self.state {
            PrefixState::Header => {
                let declared = frame.get_u32() as usize;
                if declared > self.max_frame_len {
                    return Err(DecodeError::FrameTooLarge {
                        declared,
                        max: self.max_frame_len,
                    });
                }
                self.state = PrefixState::Body(declared);
                Ok(None)
            }
            PrefixState::Body(_) => {
                self.state = PrefixState::Header;
                Ok(Some(frame))
            }
        }
    }

    fn reset(&mut self) {
        self.state = PrefixState::Header;
    }
}

/// Per-connection reassembly of whole messages from partial reads.
///
/// The pending bytes live as long as the decoder; dropping it (connection
/// teardown) discards any half-received message.
#[derive(Debug)]
pub struct IncrementalDecoder<D: FrameDecoder> {
    framer: D,
    pending: Cumulation,
}

impl<D: FrameDecoder> IncrementalDecoder<D> {
    pub fn new(framer: D) -> Self {
        Self {
            framer,
            pending: Cumulation::new(),
        }
    }

    /// Append `chunk` and return the first message it completes, if any.
    ///
    /// Further complete messages left in the surplus are returned by [`poll`](Self::poll).
    pub fn feed(&mut self, chunk: Bytes) -> Result<Option<D::Item>, DecodeError> {
        self.advance(Some(chunk))
    }

    /// Return the next message that is already fully buffered.
    pub fn poll(&mut self) -> Result<Option<D::Item>, DecodeError> {
        self.advance(None)
    }

    /// Append `chunk` and return every message now complete.
    pub fn feed_all(&mut self, chunk: Bytes) -> Result<Vec<D::Item>, DecodeError> {
        let mut items = Vec::new();
        let mut next = self.feed(chunk)?;
        while let Some(item) = next {
            items.push(item);
            next = self.poll()?;
        }
        Ok(items)
    }

    /// Bytes retained for the next message.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn framer(&self) -> &D {
        &self.framer
    }

    /// Discard retained bytes and partial framing state. Safe to call repeatedly.
    pub fn release(&mut self) {
        let discarded = self.pending.release();
        if discarded > 0 {
            tracing::trace!(discarded, "Discarding partially received message");
        }
        self.framer.reset();
    }

    fn advance(&mut self, mut chunk: Option<Bytes>) -> Result<Option<D::Item>, DecodeError> {
        loop {
            let required = self.framer.required_len();
            let Some(frame) = self.pending.take(chunk.take(), required) else {
                return Ok(None);
            };
            if let Some(item) = self.framer.decode_frame(frame)? {
                return Ok(Some(item));
            }
        }
    }
}

impl<D: FrameDecoder> Drop for IncrementalDecoder<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: usize) -> IncrementalDecoder<FixedLength> {
        IncrementalDecoder::new(FixedLength::new(NonZeroUsize::new(n).unwrap()))
    }

    #[test]
    fn hello_in_two_chunks() {
        let mut decoder = fixed(5);
        assert_eq!(decoder.feed(Bytes::from_static(b"He")).unwrap(), None);
        let message = decoder.feed(Bytes::from_static(b"llo")).unwrap().unwrap();
        assert_eq!(&message[..], b"Hello");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn one_chunk_with_several_messages() {
        let mut decoder = fixed(2);
        let messages = decoder.feed_all(Bytes::from_static(b"aabbc")).unwrap();
        assert_eq!(messages, vec![Bytes::from_static(b"aa"), Bytes::from_static(b"bb")]);
        assert_eq!(decoder.pending_len(), 1);
        assert_eq!(decoder.poll().unwrap(), None);
    }

    #[test]
    fn length_prefixed_frames_across_chunks() {
        let mut decoder = IncrementalDecoder::new(LengthPrefixed::new(1024));
        assert_eq!(decoder.feed(Bytes::from_static(&[0, 0])).unwrap(), None);
        assert_eq!(decoder.feed(Bytes::from_static(&[0, 3, b'a'])).unwrap(), None);
        let frame = decoder
            .feed(Bytes::from_static(&[b'b', b'c', 0, 0, 0, 0]))
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"abc");
        // Zero-length frame left in the surplus.
        assert_eq!(decoder.poll().unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut decoder = IncrementalDecoder::new(LengthPrefixed::new(8));
        let err = decoder.feed(Bytes::from_static(&[0, 0, 1, 0])).unwrap_err();
        assert_eq!(err, DecodeError::FrameTooLarge { declared: 256, max: 8 });
    }

    #[test]
    fn release_discards_partial_message() {
        let mut decoder = IncrementalDecoder::new(LengthPrefixed::new(64));
        decoder.feed(Bytes::from_static(&[0, 0, 0, 4, b'x'])).unwrap();
        assert_eq!(decoder.pending_len(), 1);

        decoder.release();
        decoder.release();
        assert_eq!(decoder.pending_len(), 0);

        // Back at a header boundary.
        let frame = decoder
            .feed(Bytes::from_static(&[0, 0, 0, 1, b'z']))
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"z");
    }
}
