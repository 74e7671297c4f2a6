//! The shared state segment: switch identity plus the per-port enable and
//! connection tables.
//!
//! Every read and write goes through one mutex, so a check followed by an
//! update inside a single [`SharedSegment::with_ports`] call is linearizable
//! with respect to every other task touching the segment.

use std::fmt;
use std::num::NonZeroU32;

use l2sim_types::{MacAddress, PortId, MAX_PORTS};
use parking_lot::Mutex;

use crate::error::{SimError, SimResult};

/// Identity of a participant (the switch or a station), used to address
/// lifecycle notices. Zero is reserved as the "disconnected" sentinel and
/// is therefore not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(NonZeroU32);

impl OwnerId {
    /// Wraps a raw identity; returns `None` for the zero sentinel.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(OwnerId)
    }

    /// The raw identity.
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A station bound to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub owner: OwnerId,
    pub mac: MacAddress,
}

/// One row of the port tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortSlot {
    pub enabled: bool,
    pub connection: Option<Connection>,
}

#[derive(Debug, Default)]
struct SegmentState {
    switch_owner: Option<OwnerId>,
    closing: bool,
    ports: [PortSlot; MAX_PORTS],
}

/// State readable and writable by every participant.
#[derive(Debug, Default)]
pub struct SharedSegment {
    state: Mutex<SegmentState>,
}

impl SharedSegment {
    /// Creates a zeroed segment: no switch, every port disabled and free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the running switch, if one has published itself.
    pub fn switch_owner(&self) -> Option<OwnerId> {
        self.state.lock().switch_owner
    }

    /// Publishes the switch identity so stations can address it.
    pub fn publish_switch(&self, owner: OwnerId) {
        self.state.lock().switch_owner = Some(owner);
    }

    /// Marks the switch as shutting down. From here on
    /// [`SharedSegment::with_open_ports`] refuses, while the identity stays
    /// published so departing stations can still address the switch.
    pub fn begin_shutdown(&self) {
        self.state.lock().closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    /// Runs `f` on the port tables only while a switch is published and not
    /// shutting down, checked under the same lock.
    pub fn with_open_ports<R>(
        &self,
        f: impl FnOnce(&mut [PortSlot; MAX_PORTS]) -> SimResult<R>,
    ) -> SimResult<R> {
        let mut state = self.state.lock();
        if state.switch_owner.is_none() {
            return Err(SimError::SwitchAbsent);
        }
        if state.closing {
            return Err(SimError::SwitchClosing);
        }
        f(&mut state.ports)
    }

    /// Runs `f` with exclusive access to the port tables.
    pub fn with_ports<R>(&self, f: impl FnOnce(&mut [PortSlot; MAX_PORTS]) -> R) -> R {
        f(&mut self.state.lock().ports)
    }

    /// Copy of a single port row.
    pub fn slot(&self, port: PortId) -> PortSlot {
        self.state.lock().ports[port.index()]
    }

    /// Copy of every port row.
    pub fn snapshot(&self) -> [PortSlot; MAX_PORTS] {
        self.state.lock().ports
    }

    /// Returns the segment to its zeroed state.
    pub fn reset(&self) {
        *self.state.lock() = SegmentState::default();
    }
}
