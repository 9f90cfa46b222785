//! Wire protocol definitions for lattice snapshot streaming
//!
//! The viewer sends single command bytes. The solver answers a handshake with
//! a short header carrying the grid extents, and answers a poll with a
//! fixed-length header followed by the raw payload:
//!
//! ```text
//! byte 0        status / command id
//! byte 1        sequence counter
//! byte 2        sizeOfSize (0..=8)
//! bytes 3..3+n  little-endian payload length, zero-extended to 8 bytes
//! ```
//!
//! Payload elements are little-endian IEEE-754 singles.

use crate::types::{FrameHeader, GridDimensions, HandshakeResponse};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::trace;

/// Length of a handshake response on the wire
pub const HANDSHAKE_LEN: usize = 6;

/// Default length of the fixed header that precedes a frame payload
pub const DEFAULT_HEADER_LEN: usize = 1024;

/// Largest permitted `sizeOfSize` value
pub const MAX_SIZE_OF_SIZE: u8 = 8;

/// Maximum payload size (100MB by default)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Bytes per element in the single-channel Vec4 variant
pub const VEC4_STRIDE: usize = 16;

/// Command bytes sent from the viewer to the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Request the current frame
    Poll = 0,
    /// Request the grid dimensions
    Handshake = 1,
    /// The viewer is going away
    Disconnect = 255,
}

impl Command {
    /// Convert from u8 representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Poll),
            1 => Some(Self::Handshake),
            255 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// The single byte sent on the wire
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// How the declared payload length in a frame header is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadUnit {
    /// The declared length is an exact byte count
    Bytes,
    /// The declared length counts elements of `stride` bytes each
    Elements { stride: usize },
}

impl Default for PayloadUnit {
    fn default() -> Self {
        Self::Bytes
    }
}

impl PayloadUnit {
    /// Convert a declared length into the number of payload bytes to receive
    pub fn byte_len(self, declared: u64) -> Result<usize, ProtocolError> {
        let declared = usize::try_from(declared).map_err(|_| ProtocolError::LengthOverflow)?;
        match self {
            Self::Bytes => Ok(declared),
            Self::Elements { stride } => declared
                .checked_mul(stride)
                .ok_or(ProtocolError::LengthOverflow),
        }
    }

    /// Convert a payload byte count into the length to declare on the wire
    pub fn declared_len(self, byte_len: usize) -> u64 {
        match self {
            Self::Bytes => byte_len as u64,
            Self::Elements { stride } => (byte_len / stride.max(1)) as u64,
        }
    }
}

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header too short: need {needed} bytes, got {got}")]
    HeaderTooShort { needed: usize, got: usize },

    #[error("sizeOfSize {0} exceeds the 8-byte length field")]
    SizeOfSizeTooLarge(u8),

    #[error("Declared payload length does not fit in memory")]
    LengthOverflow,

    #[error("Payload too large: {size} bytes exceeds maximum {max_size} bytes")]
    PayloadTooLarge { size: usize, max_size: usize },
}

/// Decodes a payload byte sequence into typed elements.
pub type Decoder<T> = fn(&[u8]) -> Vec<T>;

/// Parse the grid extents out of a handshake response.
pub fn parse_handshake(buf: &[u8]) -> Result<HandshakeResponse, ProtocolError> {
    if buf.len() < HANDSHAKE_LEN {
        return Err(ProtocolError::HeaderTooShort {
            needed: HANDSHAKE_LEN,
            got: buf.len(),
        });
    }

    Ok(HandshakeResponse {
        status: buf[0],
        sequence: buf[1],
        dimensions: GridDimensions::new(buf[3], buf[4], buf[5]),
    })
}

/// Encode a handshake response for the given dimensions.
pub fn encode_handshake(sequence: u8, dims: GridDimensions) -> [u8; HANDSHAKE_LEN] {
    [
        Command::Handshake.as_byte(),
        sequence,
        3,
        dims.width,
        dims.height,
        dims.depth,
    ]
}

/// Parse a frame header.
///
/// Only the first `3 + sizeOfSize` bytes are significant; the rest of the
/// fixed-length header is padding.
pub fn parse_frame_header(buf: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if buf.len() < 3 {
        return Err(ProtocolError::HeaderTooShort {
            needed: 3,
            got: buf.len(),
        });
    }

    let size_of_size = buf[2];
    if size_of_size > MAX_SIZE_OF_SIZE {
        return Err(ProtocolError::SizeOfSizeTooLarge(size_of_size));
    }

    let end = 3 + size_of_size as usize;
    if buf.len() < end {
        return Err(ProtocolError::HeaderTooShort {
            needed: end,
            got: buf.len(),
        });
    }

    let mut size_field = [0u8; 8];
    size_field[..size_of_size as usize].copy_from_slice(&buf[3..end]);
    let declared_len = LittleEndian::read_u64(&size_field);

    trace!(
        "Frame header: status={}, seq={}, sizeOfSize={}, declared={}",
        buf[0],
        buf[1],
        size_of_size,
        declared_len
    );

    Ok(FrameHeader {
        status: buf[0],
        sequence: buf[1],
        size_of_size,
        declared_len,
    })
}

/// Encode a frame header padded to `header_len` bytes.
///
/// The length field uses the fewest bytes that represent `declared_len`.
pub fn encode_frame_header(
    status: u8,
    sequence: u8,
    declared_len: u64,
    header_len: usize,
) -> Vec<u8> {
    let size_of_size = (8 - declared_len.leading_zeros() as usize / 8) as u8;
    let mut header = vec![0u8; header_len.max(3 + size_of_size as usize)];
    header[0] = status;
    header[1] = sequence;
    header[2] = size_of_size;

    let mut size_field = [0u8; 8];
    LittleEndian::write_u64(&mut size_field, declared_len);
    header[3..3 + size_of_size as usize].copy_from_slice(&size_field[..size_of_size as usize]);
    header
}

/// Decode 4-byte little-endian floats.
pub fn decode_f32s(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(4)
        .map(LittleEndian::read_f32)
        .collect()
}

/// Decode packed 12-byte `[x, y, z]` float vectors.
pub fn decode_vec3s(payload: &[u8]) -> Vec<[f32; 3]> {
    payload
        .chunks_exact(12)
        .map(|chunk| {
            [
                LittleEndian::read_f32(&chunk[0..4]),
                LittleEndian::read_f32(&chunk[4..8]),
                LittleEndian::read_f32(&chunk[8..12]),
            ]
        })
        .collect()
}

/// Decode 16-byte `[x, y, z, w]` float vectors.
pub fn decode_vec4s(payload: &[u8]) -> Vec<[f32; 4]> {
    payload
        .chunks_exact(VEC4_STRIDE)
        .map(|chunk| {
            let mut out = [0.0f32; 4];
            LittleEndian::read_f32_into(chunk, &mut out);
            out
        })
        .collect()
}

/// Decode 16-byte vectors keeping only the `[x, y, z]` part.
pub fn decode_vec4s_xyz(payload: &[u8]) -> Vec<[f32; 3]> {
    decode_vec4s(payload)
        .into_iter()
        .map(|[x, y, z, _]| [x, y, z])
        .collect()
}

/// Encode floats as little-endian bytes.
pub fn encode_f32s(values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut out);
    out
}

/// Encode packed `[x, y, z]` vectors.
pub fn encode_vec3s(values: &[[f32; 3]]) -> Vec<u8> {
    let flat: Vec<f32> = values.iter().flatten().copied().collect();
    encode_f32s(&flat)
}

/// Encode `[x, y, z, w]` vectors.
pub fn encode_vec4s(values: &[[f32; 4]]) -> Vec<u8> {
    let flat: Vec<f32> = values.iter().flatten().copied().collect();
    encode_f32s(&flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::Poll.as_byte(), 0);
        assert_eq!(Command::Handshake.as_byte(), 1);
        assert_eq!(Command::Disconnect.as_byte(), 255);
        assert_eq!(Command::from_u8(255), Some(Command::Disconnect));
        assert_eq!(Command::from_u8(7), None);
    }

    #[test]
    fn test_handshake_scenario() {
        let response = parse_handshake(&[0, 0, 2, 4, 3, 2, 9, 9]).unwrap();
        assert_eq!(response.dimensions, GridDimensions::new(4, 3, 2));

        let encoded = encode_handshake(7, GridDimensions::new(10, 1, 150));
        assert_eq!(encoded, [1, 7, 3, 10, 1, 150]);
        let parsed = parse_handshake(&encoded).unwrap();
        assert_eq!(parsed.dimensions, GridDimensions::new(10, 1, 150));
        assert_eq!(parsed.sequence, 7);
    }

    #[test]
    fn test_handshake_too_short() {
        let result = parse_handshake(&[1, 0, 3, 4]);
        assert!(matches!(
            result,
            Err(ProtocolError::HeaderTooShort { needed: 6, got: 4 })
        ));
    }

    #[test]
    fn test_frame_header_scenario() {
        let header = parse_frame_header(&[1, 5, 4, 0, 0, 1, 0, 0xAA, 0xBB]).unwrap();
        assert_eq!(header.status, 1);
        assert_eq!(header.sequence, 5);
        assert_eq!(header.size_of_size, 4);
        assert_eq!(header.declared_len, 65536);
    }

    #[test]
    fn test_frame_header_zero_extends_length() {
        // 0x00,0x01 little-endian is 256
        let header = parse_frame_header(&[0, 0, 2, 0, 1]).unwrap();
        assert_eq!(header.declared_len, 256);

        let empty = parse_frame_header(&[0, 0, 0]).unwrap();
        assert_eq!(empty.declared_len, 0);

        let full = parse_frame_header(&[0, 0, 8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
            .unwrap();
        assert_eq!(full.declared_len, u64::MAX);
    }

    #[test]
    fn test_frame_header_rejects_bad_size_of_size() {
        assert!(matches!(
            parse_frame_header(&[0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolError::SizeOfSizeTooLarge(9))
        ));
        assert!(matches!(
            parse_frame_header(&[0, 0, 4, 1]),
            Err(ProtocolError::HeaderTooShort { needed: 7, got: 4 })
        ));
    }

    #[test]
    fn test_encode_frame_header_minimal_size_of_size() {
        let header = encode_frame_header(0, 3, 256, DEFAULT_HEADER_LEN);
        assert_eq!(header.len(), DEFAULT_HEADER_LEN);
        assert_eq!(&header[..5], &[0, 3, 2, 0, 1]);

        let header = encode_frame_header(0, 0, 0, 16);
        assert_eq!(header[2], 0);
        assert_eq!(parse_frame_header(&header).unwrap().declared_len, 0);

        let header = encode_frame_header(0, 0, 1 << 40, 16);
        assert_eq!(header[2], 6);
        assert_eq!(parse_frame_header(&header).unwrap().declared_len, 1 << 40);
    }

    #[test]
    fn test_payload_unit() {
        assert_eq!(PayloadUnit::Bytes.byte_len(256).unwrap(), 256);
        let vec4 = PayloadUnit::Elements {
            stride: VEC4_STRIDE,
        };
        assert_eq!(vec4.byte_len(10).unwrap(), 160);
        assert_eq!(vec4.declared_len(160), 10);
        assert!(matches!(
            vec4.byte_len(u64::MAX),
            Err(ProtocolError::LengthOverflow)
        ));
    }

    #[test]
    fn test_float_payload_is_bit_exact() {
        let densities = [1.0f32, -0.5, f32::MIN_POSITIVE, 3.402_823_5e38, 1.0e-7];
        let bytes = encode_f32s(&densities);
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);

        let decoded = decode_f32s(&bytes);
        for (a, b) in densities.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }

        let velocities = [[0.25f32, -1.5, 7.0], [f32::EPSILON, 0.0, -0.0]];
        let decoded = decode_vec3s(&encode_vec3s(&velocities));
        assert_eq!(decoded.len(), 2);
        for (a, b) in velocities.iter().flatten().zip(decoded.iter().flatten()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_vec4_decoding() {
        let cells = [[1.0f32, 2.0, 3.0, 0.5], [4.0, 5.0, 6.0, 0.25]];
        let bytes = encode_vec4s(&cells);
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_vec4s(&bytes), cells.to_vec());
        assert_eq!(
            decode_vec4s_xyz(&bytes),
            vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]
        );
    }

    #[test]
    fn test_trailing_partial_element_is_ignored() {
        let mut bytes = encode_f32s(&[1.0, 2.0]);
        bytes.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(decode_f32s(&bytes), vec![1.0, 2.0]);
        assert!(decode_vec3s(&bytes[..8]).is_empty());
    }
}
