//! Switch port identity and administrative state.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of ports on the switch. The topology is fixed.
pub const MAX_PORTS: usize = 4;

/// A switch port, numbered `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PortId(u8);

impl PortId {
    /// Creates a port id, rejecting numbers outside `1..=4`.
    pub fn new(number: u8) -> Result<Self, ParseError> {
        if number == 0 || usize::from(number) > MAX_PORTS {
            return Err(ParseError::InvalidPort(number.to_string()));
        }
        Ok(PortId(number))
    }

    /// Creates a port id from a zero-based table index.
    pub fn from_index(index: usize) -> Result<Self, ParseError> {
        if index >= MAX_PORTS {
            return Err(ParseError::InvalidPort((index + 1).to_string()));
        }
        Ok(PortId(index as u8 + 1))
    }

    /// The one-based port number shown to operators.
    pub const fn number(&self) -> u8 {
        self.0
    }

    /// The zero-based index used for per-port tables.
    pub const fn index(&self) -> usize {
        self.0 as usize - 1
    }

    /// Iterates over every port in ascending order.
    pub fn all() -> impl Iterator<Item = PortId> {
        (1..=MAX_PORTS as u8).map(PortId)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number: u8 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidPort(s.to_string()))?;
        PortId::new(number)
    }
}

impl TryFrom<u8> for PortId {
    type Error = ParseError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        PortId::new(number)
    }
}

impl From<PortId> for u8 {
    fn from(port: PortId) -> u8 {
        port.0
    }
}

/// Administrative state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// Port does not accept or deliver frames.
    #[default]
    Disabled,
    /// Port forwards traffic.
    Enabled,
}

impl AdminState {
    /// Returns true if the port is enabled.
    pub const fn is_enabled(&self) -> bool {
        matches!(self, AdminState::Enabled)
    }
}

impl From<bool> for AdminState {
    fn from(enabled: bool) -> Self {
        if enabled {
            AdminState::Enabled
        } else {
            AdminState::Disabled
        }
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminState::Enabled => write!(f, "enabled"),
            AdminState::Disabled => write!(f, "disabled"),
        }
    }
}
