//! PortRegistry: authoritative enabled/disabled and connection state per port.
//!
//! The registry is a thin, cloneable handle over the [`SharedSegment`]. The
//! two per-port booleans are independent: disabling a port leaves its
//! connection record in place, and only [`PortRegistry::disconnect`] clears
//! it.

use std::sync::Arc;

use l2sim_types::{MacAddress, PortId, MAX_PORTS};
use tracing::{debug, info, instrument};

use crate::error::{SimError, SimResult};
use crate::port_log::PortLogs;
use crate::segment::{Connection, OwnerId, PortSlot, SharedSegment};

/// Handle to the port tables.
#[derive(Debug, Clone)]
pub struct PortRegistry {
    segment: Arc<SharedSegment>,
    logs: Arc<PortLogs>,
}

impl PortRegistry {
    /// Creates a registry over `segment`, logging state changes to `logs`.
    pub fn new(segment: Arc<SharedSegment>, logs: Arc<PortLogs>) -> Self {
        Self { segment, logs }
    }

    pub fn is_enabled(&self, port: PortId) -> bool {
        self.segment.slot(port).enabled
    }

    /// Sets the enabled flag. Idempotent; the port log records every call.
    #[instrument(skip(self), fields(port = %port))]
    pub fn set_enabled(&self, port: PortId, enabled: bool) {
        self.segment
            .with_ports(|ports| ports[port.index()].enabled = enabled);

        let state = if enabled { "enabled" } else { "disabled" };
        self.logs
            .get(port)
            .line(format!("Port - {} is {}", port, state));
        info!("Port {} {}", port, state);
    }

    /// Owner of the station on `port`, if any.
    pub fn is_connected(&self, port: PortId) -> Option<OwnerId> {
        self.segment.slot(port).connection.map(|c| c.owner)
    }

    /// Full connection record of `port`, if any.
    pub fn connection(&self, port: PortId) -> Option<Connection> {
        self.segment.slot(port).connection
    }

    /// Records a connection. Leaves an existing connection untouched; callers
    /// are expected to have checked `is_enabled && is_connected().is_none()`.
    #[instrument(skip(self), fields(port = %port, owner = %owner, mac = %mac))]
    pub fn connect(&self, port: PortId, owner: OwnerId, mac: MacAddress) {
        let stored = self.segment.with_ports(|ports| {
            let slot = &mut ports[port.index()];
            if slot.connection.is_some() {
                return false;
            }
            slot.connection = Some(Connection { owner, mac });
            true
        });

        if stored {
            info!("Station connected");
        } else {
            debug!("Port already connected, connect ignored");
        }
    }

    /// Checks that the port is enabled and free and records the connection,
    /// all under one lock acquisition.
    #[instrument(skip(self), fields(port = %port, owner = %owner, mac = %mac))]
    pub fn try_connect(&self, port: PortId, owner: OwnerId, mac: MacAddress) -> SimResult<()> {
        self.segment
            .with_ports(|ports| claim_slot(ports, port, owner, mac))?;
        info!("Station connected");
        Ok(())
    }

    /// Like [`PortRegistry::try_connect`], but also requires a running switch
    /// that is not shutting down. Every station that gets in is therefore
    /// seen by the shutdown fan-out.
    #[instrument(skip(self), fields(port = %port, owner = %owner, mac = %mac))]
    pub fn attach(&self, port: PortId, owner: OwnerId, mac: MacAddress) -> SimResult<()> {
        self.segment
            .with_open_ports(|ports| claim_slot(ports, port, owner, mac))?;
        info!("Station attached");
        Ok(())
    }

    /// Clears the connection record. The enabled flag is untouched.
    #[instrument(skip(self), fields(port = %port))]
    pub fn disconnect(&self, port: PortId) {
        let previous = self
            .segment
            .with_ports(|ports| ports[port.index()].connection.take());
        if let Some(conn) = previous {
            info!(owner = %conn.owner, mac = %conn.mac, "Station disconnected");
        }
    }

    /// Port the owner is connected to.
    pub fn find_port_by_owner(&self, owner: OwnerId) -> Option<PortId> {
        self.segment.with_ports(|ports| {
            ports
                .iter()
                .position(|slot| slot.connection.is_some_and(|c| c.owner == owner))
                .and_then(|index| PortId::from_index(index).ok())
        })
    }

    /// MAC address the owner connected with.
    pub fn find_mac_by_owner(&self, owner: OwnerId) -> Option<MacAddress> {
        self.segment.with_ports(|ports| {
            ports
                .iter()
                .filter_map(|slot| slot.connection)
                .find(|c| c.owner == owner)
                .map(|c| c.mac)
        })
    }

    /// Atomically removes the owner's connection, returning where it was.
    pub fn release_owner(&self, owner: OwnerId) -> Option<(PortId, MacAddress)> {
        self.segment.with_ports(|ports| {
            ports.iter_mut().enumerate().find_map(|(index, slot)| {
                let conn = slot.connection.filter(|c| c.owner == owner)?;
                slot.connection = None;
                PortId::from_index(index).ok().map(|port| (port, conn.mac))
            })
        })
    }

    /// True when the port is enabled and has a station attached.
    pub fn is_deliverable(&self, port: PortId) -> bool {
        let slot = self.segment.slot(port);
        slot.enabled && slot.connection.is_some()
    }

    /// Enabled ports in ascending order.
    pub fn enabled_ports(&self) -> Vec<PortId> {
        self.snapshot()
            .into_iter()
            .filter(|(_, slot)| slot.enabled)
            .map(|(port, _)| port)
            .collect()
    }

    /// Every connection, in port order.
    pub fn connections(&self) -> Vec<(PortId, Connection)> {
        self.snapshot()
            .into_iter()
            .filter_map(|(port, slot)| slot.connection.map(|c| (port, c)))
            .collect()
    }

    /// Copy of every port row, tagged with its port.
    pub fn snapshot(&self) -> Vec<(PortId, PortSlot)> {
        PortId::all().zip(self.segment.snapshot()).collect()
    }

    /// The switch-side log streams.
    pub fn logs(&self) -> &Arc<PortLogs> {
        &self.logs
    }
}

fn claim_slot(
    ports: &mut [PortSlot; MAX_PORTS],
    port: PortId,
    owner: OwnerId,
    mac: MacAddress,
) -> SimResult<()> {
    let slot = &mut ports[port.index()];
    if !slot.enabled {
        return Err(SimError::PortDisabled { port });
    }
    if slot.connection.is_some() {
        return Err(SimError::PortOccupied { port });
    }
    slot.connection = Some(Connection { owner, mac });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_log::LogTarget;
    use pretty_assertions::assert_eq;

    fn port(n: u8) -> PortId {
        PortId::new(n).unwrap()
    }

    fn owner(n: u32) -> OwnerId {
        OwnerId::new(n).unwrap()
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn registry() -> PortRegistry {
        let logs = Arc::new(PortLogs::open(&LogTarget::Memory).unwrap());
        PortRegistry::new(Arc::new(SharedSegment::new()), logs)
    }

    #[test]
    fn test_set_enabled_is_idempotent_but_logged() {
        let reg = registry();
        reg.set_enabled(port(1), true);
        let before = reg.snapshot();
        reg.set_enabled(port(1), true);

        assert_eq!(reg.snapshot(), before);
        assert!(reg.is_enabled(port(1)));
        assert_eq!(reg.logs().get(port(1)).count("Port - 1 is enabled"), 2);
    }

    #[test]
    fn test_connect_and_lookup() {
        let reg = registry();
        reg.set_enabled(port(2), true);
        reg.connect(port(2), owner(11), mac("BB:BB:BB:BB:BB:BB"));

        assert_eq!(reg.is_connected(port(2)), Some(owner(11)));
        assert_eq!(reg.find_port_by_owner(owner(11)), Some(port(2)));
        assert_eq!(
            reg.find_mac_by_owner(owner(11)),
            Some(mac("BB:BB:BB:BB:BB:BB"))
        );
        assert_eq!(reg.find_port_by_owner(owner(12)), None);
    }

    #[test]
    fn test_connect_on_connected_port_is_noop() {
        let reg = registry();
        reg.connect(port(1), owner(1), mac("AA:AA:AA:AA:AA:AA"));
        reg.connect(port(1), owner(2), mac("BB:BB:BB:BB:BB:BB"));
        assert_eq!(reg.is_connected(port(1)), Some(owner(1)));
    }

    #[test]
    fn test_try_connect_checks_state() {
        let reg = registry();
        let err = reg
            .try_connect(port(3), owner(1), mac("AA:AA:AA:AA:AA:AA"))
            .unwrap_err();
        assert!(matches!(err, SimError::PortDisabled { .. }));

        reg.set_enabled(port(3), true);
        reg.try_connect(port(3), owner(1), mac("AA:AA:AA:AA:AA:AA"))
            .unwrap();
        let err = reg
            .try_connect(port(3), owner(2), mac("BB:BB:BB:BB:BB:BB"))
            .unwrap_err();
        assert!(matches!(err, SimError::PortOccupied { .. }));
    }

    #[test]
    fn test_concurrent_try_connect_has_one_winner() {
        let reg = registry();
        reg.set_enabled(port(2), true);

        let results: Vec<SimResult<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=8)
                .map(|n| {
                    let reg = reg.clone();
                    scope.spawn(move || {
                        reg.try_connect(port(2), owner(n), mac("BB:BB:BB:BB:BB:BB"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<u32> = results
            .iter()
            .zip(1..)
            .filter(|(r, _)| r.is_ok())
            .map(|(_, n)| n)
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(SimError::PortOccupied { .. }))));
        assert_eq!(reg.is_connected(port(2)), Some(owner(winners[0])));
    }

    #[test]
    fn test_concurrent_connect_and_disconnect_stay_consistent() {
        let reg = registry();
        reg.set_enabled(port(1), true);

        std::thread::scope(|scope| {
            for n in 1..=4 {
                let reg = reg.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        if reg
                            .try_connect(port(1), owner(n), mac("AA:AA:AA:AA:AA:AA"))
                            .is_ok()
                        {
                            // Only the holder may see itself as the owner
                            assert_eq!(reg.find_port_by_owner(owner(n)), Some(port(1)));
                            assert_eq!(reg.release_owner(owner(n)).map(|(p, _)| p), Some(port(1)));
                        }
                    }
                });
            }
        });

        assert_eq!(reg.is_connected(port(1)), None);
        assert!(reg.is_enabled(port(1)));
    }

    #[test]
    fn test_attach_requires_open_switch() {
        let reg = registry();
        reg.set_enabled(port(1), true);
        let err = reg
            .attach(port(1), owner(1), mac("AA:AA:AA:AA:AA:AA"))
            .unwrap_err();
        assert!(matches!(err, SimError::SwitchAbsent));

        reg.segment.publish_switch(owner(100));
        reg.attach(port(1), owner(1), mac("AA:AA:AA:AA:AA:AA"))
            .unwrap();

        reg.segment.begin_shutdown();
        reg.set_enabled(port(2), true);
        let err = reg
            .attach(port(2), owner(2), mac("BB:BB:BB:BB:BB:BB"))
            .unwrap_err();
        assert!(matches!(err, SimError::SwitchClosing));
        assert_eq!(reg.is_connected(port(2)), None);
    }

    #[test]
    fn test_disable_keeps_connection() {
        let reg = registry();
        reg.set_enabled(port(4), true);
        reg.connect(port(4), owner(5), mac("DD:DD:DD:DD:DD:DD"));
        reg.set_enabled(port(4), false);

        assert!(!reg.is_enabled(port(4)));
        assert_eq!(reg.is_connected(port(4)), Some(owner(5)));
        assert!(!reg.is_deliverable(port(4)));
    }

    #[test]
    fn test_disconnect_keeps_enabled() {
        let reg = registry();
        reg.set_enabled(port(1), true);
        reg.connect(port(1), owner(5), mac("DD:DD:DD:DD:DD:DD"));
        reg.disconnect(port(1));

        assert!(reg.is_enabled(port(1)));
        assert_eq!(reg.is_connected(port(1)), None);
    }

    #[test]
    fn test_release_owner() {
        let reg = registry();
        reg.connect(port(2), owner(8), mac("BB:BB:BB:BB:BB:BB"));
        assert_eq!(
            reg.release_owner(owner(8)),
            Some((port(2), mac("BB:BB:BB:BB:BB:BB")))
        );
        assert_eq!(reg.release_owner(owner(8)), None);
        assert_eq!(reg.is_connected(port(2)), None);
    }

    #[test]
    fn test_enabled_ports_and_connections() {
        let reg = registry();
        reg.set_enabled(port(1), true);
        reg.set_enabled(port(3), true);
        reg.connect(port(3), owner(3), mac("CC:CC:CC:CC:CC:CC"));

        assert_eq!(reg.enabled_ports(), vec![port(1), port(3)]);
        let conns = reg.connections();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].0, port(3));
        assert_eq!(conns[0].1.owner, owner(3));
    }
}
