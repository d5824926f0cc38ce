//! Inbound frame reassembly
//!
//! TCP delivers the unit's output in arbitrary chunks: a frame may be split
//! across reads and a read may carry several frames. [`FrameReassembler`]
//! keeps the partially collected payload between chunks so frames come out
//! whole and in stream order.

use crate::error::Dfr22Error;
use crate::protocol::{END_MARKER, START_MARKER};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::codec::Decoder;

/// Longest payload accepted between a start and end marker
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Byte-stream scanner producing complete frame payloads
#[derive(Debug, Default)]
pub struct FrameReassembler {
    /// Payload bytes seen since the last start marker, `None` when idle
    pending: Option<Vec<u8>>,
    dropped: u64,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every frame it completes, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        chunk.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    /// Advance the scanner by one byte
    pub fn feed(&mut self, byte: u8) -> Option<String> {
        match byte {
            START_MARKER => {
                if let Some(partial) = self.pending.replace(Vec::with_capacity(MAX_PAYLOAD_LEN)) {
                    if !partial.is_empty() {
                        self.dropped += 1;
                        tracing::debug!(
                            "Dropping unterminated frame {:?}: new start marker",
                            decode_payload(&partial)
                        );
                    }
                }
                None
            }
            END_MARKER => match self.pending.take() {
                Some(payload) => Some(decode_payload(trim_padding(&payload))),
                None => {
                    tracing::trace!("Ignoring end marker outside a frame");
                    None
                }
            },
            _ => {
                let payload = self.pending.as_mut()?;
                if payload.len() >= MAX_PAYLOAD_LEN {
                    self.dropped += 1;
                    tracing::warn!(
                        "Dropping oversized frame starting {:?}",
                        decode_payload(payload)
                    );
                    self.pending = None;
                    return None;
                }
                payload.push(byte);
                None
            }
        }
    }

    /// Bytes collected for a frame whose end marker has not arrived yet
    pub fn remainder(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    /// Number of frames discarded as malformed so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Forget any partial frame, e.g. after the link drops
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

/// Strip trailing zero padding from a payload
fn trim_padding(payload: &[u8]) -> &[u8] {
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &payload[..end]
}

/// Payloads are single-byte text; level values may be any byte, so map
/// each byte to the char with the same code point.
fn decode_payload(payload: &[u8]) -> String {
    payload.iter().map(|&b| char::from(b)).collect()
}

/// `tokio_util` decoder yielding frame payloads from a byte stream
///
/// Dropped frames are added to a counter that outlives the decoder, so a
/// client can total them across reconnects.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    reassembler: FrameReassembler,
    dropped: Arc<AtomicU64>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder adding its dropped frames to `counter`
    pub fn with_drop_counter(counter: Arc<AtomicU64>) -> Self {
        Self {
            reassembler: FrameReassembler::new(),
            dropped: counter,
        }
    }

    /// Frames dropped so far, including those of decoders sharing the counter
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Decoder for FrameDecoder {
    type Item = String;
    type Error = Dfr22Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            tracing::trace!("Scanning {} inbound bytes", src.len());
        }
        let dropped_before = self.reassembler.dropped_frames();
        let mut frame = None;
        while frame.is_none() && src.has_remaining() {
            frame = self.reassembler.feed(src.get_u8());
        }

        let dropped = self.reassembler.dropped_frames() - dropped_before;
        if dropped > 0 {
            tracing::debug!("Dropped {} malformed inbound frame(s)", dropped);
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(src)?;
        if frame.is_none() {
            if let Some(partial) = self.reassembler.remainder() {
                tracing::debug!("Stream ended inside a frame: {:?}", decode_payload(partial));
            }
            self.reassembler.reset();
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &str) -> Vec<u8> {
        let mut bytes = vec![START_MARKER];
        bytes.extend_from_slice(payload.as_bytes());
        bytes.push(END_MARKER);
        bytes
    }

    #[test]
    fn test_single_frame() {
        let mut r = FrameReassembler::new();
        assert_eq!(r.push(&frame("OUT002M001")), vec!["OUT002M001"]);
        assert!(r.remainder().is_none());
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut r = FrameReassembler::new();
        let mut chunk = frame("INP001M001");
        chunk.extend_from_slice(&[0x0D, 0x0A]);
        chunk.extend_from_slice(&frame("MIX002001C000"));

        assert_eq!(r.push(&chunk), vec!["INP001M001", "MIX002001C000"]);
    }

    #[test]
    fn test_split_at_every_position_matches_whole() {
        let mut stream = frame("DFR22001INP001L00W");
        stream.extend_from_slice(&frame("DFR22001OUT001M000"));
        let whole = FrameReassembler::new().push(&stream);
        assert_eq!(whole.len(), 2);

        for split in 0..=stream.len() {
            let mut r = FrameReassembler::new();
            let mut frames = r.push(&stream[..split]);
            frames.extend(r.push(&stream[split..]));
            assert_eq!(frames, whole, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = frame("MIX001OUTL00\x50");
        let mut r = FrameReassembler::new();
        let frames: Vec<String> = stream.iter().flat_map(|b| r.push(&[*b])).collect();
        assert_eq!(frames, vec!["MIX001OUTL00\x50"]);
    }

    #[test]
    fn test_remainder_carries_across_chunks() {
        let mut r = FrameReassembler::new();
        assert!(r.push(&[START_MARKER, b'I', b'N', b'P']).is_empty());
        assert_eq!(r.remainder(), Some(&b"INP"[..]));
        assert_eq!(r.push(b"001M001\xD1"), vec!["INP001M001"]);
        assert!(r.remainder().is_none());
    }

    #[test]
    fn test_oversized_frame_is_dropped_and_next_frame_survives() {
        let mut r = FrameReassembler::new();
        let mut stream = frame(&"X".repeat(MAX_PAYLOAD_LEN + 1));
        stream.extend_from_slice(&frame("INP002M000"));

        assert_eq!(r.push(&stream), vec!["INP002M000"]);
        assert_eq!(r.dropped_frames(), 1);
    }

    #[test]
    fn test_payload_at_capacity_is_kept() {
        let payload = "Y".repeat(MAX_PAYLOAD_LEN);
        let mut r = FrameReassembler::new();
        assert_eq!(r.push(&frame(&payload)), vec![payload]);
    }

    #[test]
    fn test_bytes_outside_frames_are_ignored() {
        let mut r = FrameReassembler::new();
        let mut chunk = b"garbage".to_vec();
        chunk.push(END_MARKER);
        chunk.extend_from_slice(&frame("QRY"));
        chunk.extend_from_slice(b"\r\n");
        assert_eq!(r.push(&chunk), vec!["QRY"]);
    }

    #[test]
    fn test_start_marker_restarts_collection() {
        let mut r = FrameReassembler::new();
        let mut chunk = vec![START_MARKER];
        chunk.extend_from_slice(b"INP0");
        chunk.extend_from_slice(&frame("OUT001M001"));
        assert_eq!(r.push(&chunk), vec!["OUT001M001"]);
        assert_eq!(r.dropped_frames(), 1);
    }

    #[test]
    fn test_trailing_zero_padding_is_trimmed() {
        let mut r = FrameReassembler::new();
        assert_eq!(r.push(b"\xD0INP001M001\0\0\xD1"), vec!["INP001M001"]);
    }

    #[test]
    fn test_decoder_yields_frames_across_buffers() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&b"\xD0INP001L"[..]);
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"00\x1B\xD1\xD0OUT001M001\xD1");
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("INP001L00\x1B"));
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("OUT001M001"));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decoder_counts_dropped_frames_into_shared_counter() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut decoder = FrameDecoder::with_drop_counter(counter.clone());

        let mut buf = BytesMut::from(&[START_MARKER; 1][..]);
        buf.extend_from_slice(&[b'X'; MAX_PAYLOAD_LEN + 1]);
        buf.extend_from_slice(b"\xD1\xD0OUT001M001\xD1");
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("OUT001M001"));
        assert_eq!(decoder.dropped_frames(), 1);

        let mut next = FrameDecoder::with_drop_counter(counter.clone());
        let mut buf = BytesMut::from(&b"\xD0INP\xD0INP001M000\xD1"[..]);
        assert_eq!(next.decode(&mut buf).unwrap().as_deref(), Some("INP001M000"));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
