//! MacLearningTable - address to port mapping learned from traffic.
//!
//! Entries are keyed by address and updated in place, so relearning an
//! address on another port replaces the old binding instead of shadowing it.
//! The most recent `learn` for an address is always the one `lookup` sees.

use std::collections::HashMap;

use l2sim_types::{MacAddress, PortId};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

/// One learned binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MacEntry {
    pub port: PortId,
    pub mac: MacAddress,
}

/// Counters kept alongside the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacTableStats {
    pub entries_learned: u64,
    pub entries_moved: u64,
    pub entries_forgotten: u64,
}

#[derive(Debug, Default)]
struct TableState {
    entries: HashMap<MacAddress, PortId>,
    stats: MacTableStats,
}

impl TableState {
    fn insert(&mut self, mac: MacAddress, port: PortId) -> Option<PortId> {
        let previous = self.entries.insert(mac, port);
        match previous {
            None => self.stats.entries_learned += 1,
            Some(old) if old != port => self.stats.entries_moved += 1,
            Some(_) => {}
        }
        previous
    }
}

/// The switch's learning table. All operations take one internal lock.
#[derive(Debug, Default)]
pub struct MacLearningTable {
    state: Mutex<TableState>,
}

impl MacLearningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `mac` to `port`, returning the port it was bound to before.
    #[instrument(skip(self), fields(mac = %mac, port = %port))]
    pub fn learn(&self, mac: MacAddress, port: PortId) -> Option<PortId> {
        let previous = self.state.lock().insert(mac, port);
        match previous {
            Some(old) if old != port => info!(from = %old, "MAC moved"),
            Some(_) => {}
            None => debug!("MAC learned"),
        }
        previous
    }

    /// Binds `mac` to `port` unless the address is already known.
    ///
    /// Returns true if a new entry was created. The check and the insert
    /// happen under one lock.
    pub fn learn_if_unknown(&self, mac: MacAddress, port: PortId) -> bool {
        let mut state = self.state.lock();
        if state.entries.contains_key(&mac) {
            return false;
        }
        state.insert(mac, port);
        drop(state);
        debug!(%mac, %port, "MAC learned");
        true
    }

    pub fn lookup(&self, mac: &MacAddress) -> Option<PortId> {
        self.state.lock().entries.get(mac).copied()
    }

    pub fn is_known(&self, mac: &MacAddress) -> bool {
        self.state.lock().entries.contains_key(mac)
    }

    /// Removes the entry for `mac`. No-op if absent.
    #[instrument(skip(self), fields(mac = %mac))]
    pub fn forget(&self, mac: &MacAddress) -> Option<PortId> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(mac);
        if removed.is_some() {
            state.stats.entries_forgotten += 1;
        }
        drop(state);

        if let Some(port) = removed {
            info!(%port, "MAC forgotten");
        }
        removed
    }

    /// Every entry, ordered by port and then address.
    pub fn entries(&self) -> Vec<MacEntry> {
        let mut entries: Vec<MacEntry> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|(mac, port)| MacEntry {
                port: *port,
                mac: *mac,
            })
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MacTableStats {
        self.state.lock().stats.clone()
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        drop(state);
        debug!(dropped, "MAC table cleared");
    }
}
