//! Fixed-layout frame codec.
//!
//! Layout of the 100-byte wire form:
//!
//! | Bytes    | Content                          |
//! |----------|----------------------------------|
//! | 0..17    | source MAC, text form            |
//! | 17       | field delimiter (space)          |
//! | 18..35   | destination MAC, text form       |
//! | 35       | field delimiter (space)          |
//! | 36..100  | opaque payload, NUL padded       |

use crate::{MacAddress, ParseError};
use std::fmt;

/// Size of every frame on a port channel.
pub const FRAME_SIZE: usize = 100;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = FRAME_SIZE - PAYLOAD_OFFSET;

const SRC_OFFSET: usize = 0;
const DST_OFFSET: usize = 18;
const PAYLOAD_OFFSET: usize = 36;
const DELIMITERS: [usize; 2] = [17, 35];
const DELIMITER: u8 = b' ';

/// A frame exactly as it travels over a port channel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WireFrame([u8; FRAME_SIZE]);

impl WireFrame {
    /// Wraps raw bytes, rejecting anything that is not exactly [`FRAME_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw: [u8; FRAME_SIZE] = bytes
            .try_into()
            .map_err(|_| ParseError::FrameLength(bytes.len()))?;
        Ok(WireFrame(raw))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    /// Parses the source address at its fixed offset.
    pub fn source(&self) -> Result<MacAddress, ParseError> {
        MacAddress::from_text_bytes(&self.0[SRC_OFFSET..SRC_OFFSET + MacAddress::TEXT_LEN])
    }

    /// Parses the destination address at its fixed offset.
    pub fn destination(&self) -> Result<MacAddress, ParseError> {
        MacAddress::from_text_bytes(&self.0[DST_OFFSET..DST_OFFSET + MacAddress::TEXT_LEN])
    }

    /// Returns the payload area, including any NUL padding.
    pub fn payload(&self) -> &[u8] {
        &self.0[PAYLOAD_OFFSET..]
    }

    /// Decodes the full frame.
    pub fn decode(&self) -> Result<Frame, ParseError> {
        for &at in &DELIMITERS {
            if self.0[at] != DELIMITER {
                return Err(ParseError::MalformedFrame(format!(
                    "expected delimiter at byte {}, found 0x{:02x}",
                    at, self.0[at]
                )));
            }
        }

        let payload = self.payload();
        let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);

        Ok(Frame {
            source: self.source()?,
            destination: self.destination()?,
            payload: payload[..end].to_vec(),
        })
    }
}

impl fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WireFrame")
            .field(&String::from_utf8_lossy(&self.0[..PAYLOAD_OFFSET]))
            .finish()
    }
}

/// A decoded frame. The payload is only settable through [`Frame::new`],
/// so it never exceeds [`MAX_PAYLOAD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub source: MacAddress,
    pub destination: MacAddress,
    payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame, rejecting payloads larger than [`MAX_PAYLOAD`].
    pub fn new(
        source: MacAddress,
        destination: MacAddress,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, ParseError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(ParseError::PayloadTooLarge(payload.len()));
        }
        Ok(Frame {
            source,
            destination,
            payload,
        })
    }

    /// Payload bytes, without padding.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns true if the frame is addressed to every station.
    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }

    /// Encodes the frame into its wire form.
    pub fn encode(&self) -> WireFrame {
        let mut raw = [0u8; FRAME_SIZE];
        self.source
            .write_text(&mut raw[SRC_OFFSET..SRC_OFFSET + MacAddress::TEXT_LEN]);
        self.destination
            .write_text(&mut raw[DST_OFFSET..DST_OFFSET + MacAddress::TEXT_LEN]);
        for &at in &DELIMITERS {
            raw[at] = DELIMITER;
        }
        let len = self.payload.len().min(MAX_PAYLOAD);
        raw[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].copy_from_slice(&self.payload[..len]);
        WireFrame(raw)
    }

    /// Payload as text, for log lines.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
