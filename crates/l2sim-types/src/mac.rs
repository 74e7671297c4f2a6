//! MAC address type with strict parsing and canonical formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit station address.
///
/// The text form is always 17 characters of colon-separated hex. Parsing
/// accepts either case; formatting is upper case, which is the canonical
/// form carried inside frames.
///
/// # Examples
///
/// ```
/// use l2sim_types::MacAddress;
///
/// let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
/// assert_eq!(mac.to_string(), "AA:BB:CC:DD:EE:FF");
/// assert!("AA-BB-CC-DD-EE-FF".parse::<MacAddress>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast address (FF:FF:FF:FF:FF:FF).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Length of the text form.
    pub const TEXT_LEN: usize = 17;

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == Self::BROADCAST.0
    }

    /// Parses the 17-byte text form found at a fixed frame offset.
    pub fn from_text_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ParseError::InvalidMacAddress(String::from_utf8_lossy(bytes).into()))?;
        text.parse()
    }

    /// Writes the canonical text form into a 17-byte slot.
    pub(crate) fn write_text(&self, slot: &mut [u8]) {
        slot.copy_from_slice(self.to_string().as_bytes());
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMacAddress(s.to_string());

        if s.len() != Self::TEXT_LEN {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_display_is_upper_case() {
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(mac.to_string().len(), MacAddress::TEXT_LEN);
    }

    #[test]
    fn test_mixed_case_parses_to_same_address() {
        let upper: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let lower: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_broadcast() {
        let mac: MacAddress = "FF:FF:FF:FF:FF:FF".parse().unwrap();
        assert!(mac.is_broadcast());
        assert_eq!(mac, MacAddress::BROADCAST);
        assert!(!"AA:AA:AA:AA:AA:AA".parse::<MacAddress>().unwrap().is_broadcast());
    }

    #[test]
    fn test_from_text_bytes() {
        let mac = MacAddress::from_text_bytes(b"BB:BB:BB:BB:BB:BB").unwrap();
        assert_eq!(mac.as_bytes(), &[0xbb; 6]);
        assert!(MacAddress::from_text_bytes(&[0xff; 17]).is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("00-11-22-33-44-55".parse::<MacAddress>().is_err());
        assert!("0:111:22:33:44:55".parse::<MacAddress>().is_err());
    }
}
