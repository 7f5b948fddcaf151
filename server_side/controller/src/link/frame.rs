use std::fmt;

use super::crc::crc8;

pub const PREAMBLE: [u8; 2] = [0xAC, 0x53];

pub const LEN_INDEX: usize = 2;
pub const SEQUENCE_INDEX: usize = 3;
pub const ADDRESS_INDEX: usize = 4;
pub const OPCODE_INDEX: usize = 5;
pub const PAYLOAD_START_INDEX: usize = 6;

/// Accepted range of the length byte. The length covers sequence, address, opcode, payload and crc.
pub const MIN_DECLARED_LEN: u8 = 4;
pub const MAX_DECLARED_LEN: u8 = 253;
pub const MAX_PAYLOAD_LEN: usize = (MAX_DECLARED_LEN - MIN_DECLARED_LEN) as usize;

/// Hard cap on the bytes accepted for one frame.
pub const MAX_FRAME_LEN: usize = 256;
pub const FRAME_BUFFER_SIZE: usize = MAX_FRAME_LEN + 1;

/// Total frame size implied by a length byte.
pub fn frame_len(declared_len: u8) -> usize {
    LEN_INDEX + declared_len as usize + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sequence: u8,
    pub address: u8,
    pub opcode: u8,
}

/// A structurally valid frame handed from the receiver to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}
impl Frame {
    /// `bytes` must already have passed every framing check.
    pub(crate) fn from_validated(bytes: Vec<u8>) -> Self {
        Frame { bytes }
    }
    pub fn declared_len(&self) -> u8 {
        self.bytes[LEN_INDEX]
    }
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            sequence: self.bytes[SEQUENCE_INDEX],
            address: self.bytes[ADDRESS_INDEX],
            opcode: self.bytes[OPCODE_INDEX],
        }
    }
    pub fn opcode(&self) -> u8 {
        self.bytes[OPCODE_INDEX]
    }
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PAYLOAD_START_INDEX..self.bytes.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEncodeError {
    PayloadTooLong { len: usize, max: usize },
}
impl fmt::Display for FrameEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameEncodeError::PayloadTooLong { len, max } => {
                write!(f, "payload of {} bytes exceeds the maximum of {}", len, max)
            }
        }
    }
}
impl std::error::Error for FrameEncodeError {}

/// Builds a complete wire frame: preamble, length, header, payload, crc over everything before it.
pub fn encode_frame(header: FrameHeader, payload: &[u8]) -> Result<Vec<u8>, FrameEncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameEncodeError::PayloadTooLong {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let declared_len = payload.len() as u8 + MIN_DECLARED_LEN;
    let mut out = Vec::with_capacity(frame_len(declared_len));
    out.extend_from_slice(&PREAMBLE);
    out.push(declared_len);
    out.push(header.sequence);
    out.push(header.address);
    out.push(header.opcode);
    out.extend_from_slice(payload);
    out.push(crc8(&out));
    Ok(out)
}
