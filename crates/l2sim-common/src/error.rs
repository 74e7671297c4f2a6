//! Error types shared by the switch and its stations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::time::Duration;

use l2sim_types::{ParseError, PortId};
use thiserror::Error;

use crate::segment::OwnerId;

/// Result type alias for simulator operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors that can occur while operating the switch or a station.
#[derive(Debug, Error)]
pub enum SimError {
    /// A port number outside `1..=4`, or any other unparsable input.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The port is administratively disabled.
    #[error("Port - {port} is disabled")]
    PortDisabled {
        /// The port that was disabled.
        port: PortId,
    },

    /// Another station already owns the port.
    #[error("Port - {port} is already connected to a station")]
    PortOccupied {
        /// The occupied port.
        port: PortId,
    },

    /// The owner is not connected to any port.
    #[error("Owner {owner} is not connected to any port")]
    NotConnected {
        /// The owner that was looked up.
        owner: OwnerId,
    },

    /// No mailbox is registered for the owner.
    #[error("No mailbox registered for owner {owner}")]
    UnknownOwner {
        /// The owner that was addressed.
        owner: OwnerId,
    },

    /// The switch has not published its identity.
    #[error("Switch identity is not published")]
    SwitchAbsent,

    /// The switch is shutting down and takes no new stations.
    #[error("Switch is shutting down")]
    SwitchClosing,

    /// The channel behind a port has been closed.
    #[error("Channel for port - {port} is closed")]
    ChannelClosed {
        /// The port whose channel is closed.
        port: PortId,
    },

    /// The port's send permit was released by teardown.
    #[error("Send permit for port - {port} is closed")]
    PermitClosed {
        /// The port whose permit is closed.
        port: PortId,
    },

    /// A bounded delivery attempt did not complete in time.
    #[error("Delivery to port - {port} timed out after {waited:?}")]
    DeliveryTimeout {
        /// The destination port.
        port: PortId,
        /// How long the sender waited.
        waited: Duration,
    },

    /// The operation was abandoned because its owner is shutting down.
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Log or config file IO failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl SimError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the error means the surrounding resources are gone
    /// and the caller should stop rather than continue with the next frame.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            SimError::ChannelClosed { .. } | SimError::PermitClosed { .. } | SimError::Cancelled
        )
    }
}
