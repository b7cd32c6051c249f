//! Reassembly must not depend on where the network splits the stream.

use std::num::NonZeroUsize;

use bytes::{BufMut, Bytes, BytesMut};
use proptest::prelude::*;

use portmux::codec::{FixedLength, IncrementalDecoder, LengthPrefixed, MessageDecoder};

/// Split `data` at the given cut points (taken modulo its length).
fn split(data: &[u8], cuts: &[usize]) -> Vec<Bytes> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|cut| if data.is_empty() { 0 } else { cut % (data.len() + 1) })
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(data.len())) {
        chunks.push(Bytes::copy_from_slice(&data[start..point]));
        start = point;
    }
    chunks
}

fn length_prefixed(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut out = BytesMut::new();
    for frame in frames {
        out.put_u32(frame.len() as u32);
        out.put_slice(frame);
    }
    out.to_vec()
}

proptest! {
    #[test]
    fn fixed_length_frames_survive_any_split(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        len in 1usize..16,
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut decoder = IncrementalDecoder::new(FixedLength::new(NonZeroUsize::new(len).unwrap()));
        let mut frames = Vec::new();
        for chunk in split(&data, &cuts) {
            frames.extend(decoder.feed_all(chunk).unwrap());
        }

        let expected: Vec<&[u8]> = data.chunks_exact(len).collect();
        prop_assert_eq!(frames.len(), expected.len());
        for (frame, want) in frames.iter().zip(expected) {
            prop_assert_eq!(&frame[..], want);
        }
        prop_assert_eq!(decoder.pending_len(), data.len() % len);
    }

    #[test]
    fn length_prefixed_frames_survive_any_split(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..48), 0..8),
        cuts in proptest::collection::vec(any::<usize>(), 0..16),
    ) {
        let stream = length_prefixed(&payloads);
        let mut decoder = IncrementalDecoder::new(LengthPrefixed::new(64));
        let mut frames = Vec::new();
        for chunk in split(&stream, &cuts) {
            frames.extend(decoder.feed_all(chunk).unwrap());
        }

        prop_assert_eq!(frames.len(), payloads.len());
        for (frame, want) in frames.iter().zip(&payloads) {
            prop_assert_eq!(&frame[..], &want[..]);
        }
        prop_assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn text_survives_any_split(
        text in "\\PC{0,64}",
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let bytes = text.as_bytes();
        let mut decoder = MessageDecoder::new();
        let mut decoded = None;
        for chunk in split(bytes, &cuts) {
            decoder.feed(chunk);
            if let Some(message) = decoder.read_chars(bytes.len()).unwrap() {
                decoded = Some(message.to_owned());
                break;
            }
        }
        if decoded.is_none() {
            decoded = decoder.read_chars(bytes.len()).unwrap().map(str::to_owned);
        }
        prop_assert_eq!(decoded.as_deref(), Some(text.as_str()));
    }
}
