//! Wire-level types shared by the switch and its stations.
//!
//! - [`MacAddress`]: 48-bit station address in its 17-character text form
//! - [`PortId`]: one of the four switch ports
//! - [`AdminState`]: enabled/disabled state of a port
//! - [`Frame`] / [`WireFrame`]: the fixed 100-byte frame exchanged over port channels

mod frame;
mod mac;
mod port;

pub use frame::{Frame, WireFrame, FRAME_SIZE, MAX_PAYLOAD};
pub use mac::MacAddress;
pub use port::{AdminState, PortId, MAX_PORTS};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address: {0} (expected 17 characters, e.g. AA:BB:CC:DD:EE:FF)")]
    InvalidMacAddress(String),

    #[error("invalid port number: {0} (must be 1-{max})", max = MAX_PORTS)]
    InvalidPort(String),

    #[error("payload of {0} bytes exceeds the {max}-byte frame payload", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("frame is {0} bytes, expected {size}", size = FRAME_SIZE)]
    FrameLength(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
