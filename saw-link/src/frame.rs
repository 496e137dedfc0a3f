//! Wire-format definitions for data-link frames.
//!
//! Every unit exchanged between adjacent nodes is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (kind, sequence bit, length, checksum,
//!   payload).
//! - Serialising a [`Frame`] into a byte buffer ready for the physical layer.
//! - Validating and deserialising raw bytes back into a [`Frame`], returning
//!   errors for corrupted, truncated, or malformed input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |   Sequence    |        Payload Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 6 bytes.
//! kind(1) + seq(1) + payload_len(2) + checksum(2)
//!
//! The checksum is CRC-16-CCITT over the whole serialised frame with the
//! checksum field zeroed.  It detects every single-bit error, so a frame whose
//! header was hit by one flipped bit is always rejected.

use thiserror::Error;

/// Largest payload the application may hand down in one frame.
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 6;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_PAYLOAD_LEN: usize = 2;
const OFF_CHECKSUM: usize = 4;

const TAG_DATA: u8 = 0;
const TAG_ACK: u8 = 1;

/// The two frame kinds this protocol ever puts on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Ack,
}

impl FrameKind {
    fn tag(self) -> u8 {
        match self {
            FrameKind::Data => TAG_DATA,
            FrameKind::Ack => TAG_ACK,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            TAG_DATA => Ok(FrameKind::Data),
            TAG_ACK => Ok(FrameKind::Ack),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Data => write!(f, "DATA"),
            FrameKind::Ack => write!(f, "ACK"),
        }
    }
}

/// A one-bit sequence number.
///
/// Stop-and-wait keeps at most one frame outstanding per window, so a single
/// alternating bit is enough to tell a new frame from a retransmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqBit(bool);

impl SeqBit {
    pub const ZERO: SeqBit = SeqBit(false);
    pub const ONE: SeqBit = SeqBit(true);

    /// The other bit.
    #[must_use]
    pub fn flip(self) -> Self {
        SeqBit(!self.0)
    }

    pub fn value(self) -> u8 {
        u8::from(self.0)
    }

    /// The bit a window holds after `n` advances from zero.
    pub fn after(n: u64) -> Self {
        SeqBit(n % 2 == 1)
    }
}

impl TryFrom<u8> for SeqBit {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SeqBit::ZERO),
            1 => Ok(SeqBit::ONE),
            other => Err(FrameError::InvalidSeq(other)),
        }
    }
}

impl std::fmt::Display for SeqBit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// A complete data-link frame: header fields + payload bytes.
///
/// ACK frames always carry an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub seq: SeqBit,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A DATA frame carrying `payload`.
    pub fn data(seq: SeqBit, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Data,
            seq,
            payload,
        }
    }

    /// A payload-less ACK frame.
    pub fn ack(seq: SeqBit) -> Self {
        Self {
            kind: FrameKind::Ack,
            seq,
            payload: Vec::new(),
        }
    }

    /// Serialised size: header plus the actual payload, never a fixed maximum.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// The length and checksum fields are computed here; the checksum is
    /// calculated with its own field zeroed and written last.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_MESSAGE_SIZE {
            return Err(FrameError::PayloadTooLarge {
                len: payload_len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if self.kind == FrameKind::Ack && payload_len != 0 {
            return Err(FrameError::AckWithPayload);
        }

        Ok(self.write())
    }

    /// Encode an ACK frame; ACKs have no payload, so this cannot fail.
    pub fn encode_ack(seq: SeqBit) -> Vec<u8> {
        Frame::ack(seq).write()
    }

    // Callers have checked the payload bound and the ACK-is-empty rule.
    fn write(&self) -> Vec<u8> {
        let payload_len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + payload_len];
        buf[OFF_KIND] = self.kind.tag();
        buf[OFF_SEQ] = self.seq.value();
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2]
            .copy_from_slice(&(payload_len as u16).to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = ccitt(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    /// Validate and parse a [`Frame`] from a raw byte slice.
    ///
    /// The checksum is verified before any field is trusted, so corruption
    /// anywhere in the frame surfaces as [`FrameError::ChecksumFailed`].
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::TooShort { len: buf.len() });
        }

        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
        let mut scratch = buf.to_vec();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
        if ccitt(&scratch) != checksum {
            return Err(FrameError::ChecksumFailed);
        }

        let payload_len =
            u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]) as usize;
        if buf.len() != HEADER_LEN + payload_len {
            return Err(FrameError::LengthMismatch {
                declared: payload_len,
                actual: buf.len() - HEADER_LEN,
            });
        }

        if payload_len > MAX_MESSAGE_SIZE {
            return Err(FrameError::PayloadTooLarge {
                len: payload_len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let kind = FrameKind::from_tag(buf[OFF_KIND])?;
        let seq = SeqBit::try_from(buf[OFF_SEQ])?;
        if kind == FrameKind::Ack && payload_len != 0 {
            return Err(FrameError::AckWithPayload);
        }

        Ok(Frame {
            kind,
            seq,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when building or parsing a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame of {len} bytes is shorter than the frame header")]
    TooShort { len: usize },

    #[error("checksum verification failed")]
    ChecksumFailed,

    #[error("payload length field says {declared} bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown frame kind tag {0}")]
    UnknownKind(u8),

    #[error("sequence field {0} is not a single bit")]
    InvalidSeq(u8),

    #[error("ACK frame carries a payload")]
    AckWithPayload,

    #[error("payload of {len} bytes exceeds the {max}-byte message limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// CRC-16-CCITT (polynomial `0x1021`, initial value zero, unreflected).
///
/// The caller must zero the checksum field within `data` first.
fn ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_roundtrip() {
        for seq in [SeqBit::ZERO, SeqBit::ONE] {
            let frame = Frame::data(seq, b"hello".to_vec());
            let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn ack_frame_roundtrip() {
        let frame = Frame::ack(SeqBit::ONE);
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind, FrameKind::Ack);
        assert_eq!(decoded.seq, SeqBit::ONE);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn max_size_payload_roundtrip() {
        let payload: Vec<u8> = (0..MAX_MESSAGE_SIZE).map(|i| (i % 251) as u8).collect();
        let frame = Frame::data(SeqBit::ZERO, payload);
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let data = Frame::data(SeqBit::ZERO, b"exactly twelve!".to_vec());
        assert_eq!(data.encode().unwrap().len(), HEADER_LEN + 15);
        assert_eq!(data.encoded_len(), HEADER_LEN + 15);

        let ack = Frame::ack(SeqBit::ZERO);
        assert_eq!(ack.encode().unwrap().len(), HEADER_LEN);
    }

    #[test]
    fn header_fields_on_wire() {
        let bytes = Frame::data(SeqBit::ONE, vec![0xaa; 0x0102]).encode().unwrap();
        assert_eq!(bytes[OFF_KIND], TAG_DATA);
        assert_eq!(bytes[OFF_SEQ], 1);
        assert_eq!(&bytes[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2], &[0x01, 0x02]);
    }

    #[test]
    fn ccitt_check_value() {
        // Standard check value for the zero-initialised CCITT variant.
        assert_eq!(ccitt(b"123456789"), 0x31c3);
    }

    #[test]
    fn single_bit_flip_in_header_fails_checksum() {
        let frames = [
            Frame::data(SeqBit::ZERO, b"payload".to_vec()),
            Frame::data(SeqBit::ONE, Vec::new()),
            Frame::ack(SeqBit::ONE),
        ];
        for frame in frames {
            let bytes = frame.encode().unwrap();
            for bit in 0..HEADER_LEN * 8 {
                let mut corrupt = bytes.clone();
                corrupt[bit / 8] ^= 1 << (bit % 8);
                assert_eq!(
                    Frame::decode(&corrupt),
                    Err(FrameError::ChecksumFailed),
                    "bit {bit} of {frame:?}"
                );
            }
        }
    }

    #[test]
    fn corrupt_payload_byte_fails_checksum() {
        let mut bytes = Frame::data(SeqBit::ZERO, b"test".to_vec()).encode().unwrap();
        bytes[HEADER_LEN + 2] ^= 0x40;
        assert_eq!(Frame::decode(&bytes), Err(FrameError::ChecksumFailed));
    }

    #[test]
    fn decode_short_buffer_returns_error() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::TooShort { len: 0 }));
        assert_eq!(
            Frame::decode(&[0u8; HEADER_LEN - 1]),
            Err(FrameError::TooShort { len: HEADER_LEN - 1 })
        );
    }

    #[test]
    fn decode_truncated_payload_fails() {
        let mut bytes = Frame::data(SeqBit::ZERO, b"data".to_vec()).encode().unwrap();
        bytes.pop();
        // The checksum covers the dropped byte, so it fails first.
        assert_eq!(Frame::decode(&bytes), Err(FrameError::ChecksumFailed));
    }

    #[test]
    fn length_mismatch_with_valid_checksum() {
        let mut buf = vec![TAG_DATA, 0, 0, 9, 0, 0, b'x'];
        let csum = ccitt(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        assert_eq!(
            Frame::decode(&buf),
            Err(FrameError::LengthMismatch {
                declared: 9,
                actual: 1
            })
        );
    }

    #[test]
    fn unknown_kind_and_bad_seq_rejected() {
        let mut buf = vec![7, 0, 0, 0, 0, 0];
        let csum = ccitt(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        assert_eq!(Frame::decode(&buf), Err(FrameError::UnknownKind(7)));

        let mut buf = vec![TAG_ACK, 2, 0, 0, 0, 0];
        let csum = ccitt(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        assert_eq!(Frame::decode(&buf), Err(FrameError::InvalidSeq(2)));
    }

    #[test]
    fn oversized_payload_refused() {
        let frame = Frame::data(SeqBit::ZERO, vec![0; MAX_MESSAGE_SIZE + 1]);
        assert_eq!(
            frame.encode(),
            Err(FrameError::PayloadTooLarge {
                len: MAX_MESSAGE_SIZE + 1,
                max: MAX_MESSAGE_SIZE
            })
        );
    }

    #[test]
    fn encode_ack_matches_encode() {
        assert_eq!(
            Frame::encode_ack(SeqBit::ONE),
            Frame::ack(SeqBit::ONE).encode().unwrap()
        );
    }

    #[test]
    fn ack_with_payload_refused() {
        let frame = Frame {
            kind: FrameKind::Ack,
            seq: SeqBit::ZERO,
            payload: b"x".to_vec(),
        };
        assert_eq!(frame.encode(), Err(FrameError::AckWithPayload));
    }

    #[test]
    fn seq_bit_flip_and_parity() {
        assert_eq!(SeqBit::ZERO.flip(), SeqBit::ONE);
        assert_eq!(SeqBit::ONE.flip(), SeqBit::ZERO);
        assert_eq!(SeqBit::after(0), SeqBit::ZERO);
        assert_eq!(SeqBit::after(7), SeqBit::ONE);
        assert_eq!(SeqBit::after(10), SeqBit::ZERO);
    }
}
