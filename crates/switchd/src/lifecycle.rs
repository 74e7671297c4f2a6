//! Switch side of the lifecycle protocol.
//!
//! The switch listens on its own mailbox for `StationDisconnect` and tells
//! every attached station when it is going away.

use std::sync::Arc;

use l2sim_common::{Fabric, Notice, NoticeReceiver, OwnerId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::mac_table::MacLearningTable;

/// Applies lifecycle notices to the port registry and the MAC table.
#[derive(Debug, Clone)]
pub struct LifecycleHandler {
    fabric: Arc<Fabric>,
    table: Arc<MacLearningTable>,
}

impl LifecycleHandler {
    pub fn new(fabric: Arc<Fabric>, table: Arc<MacLearningTable>) -> Self {
        Self { fabric, table }
    }

    /// Applies one notice addressed to the switch.
    pub fn handle(&self, notice: Notice) {
        match notice {
            Notice::StationDisconnect { owner } => self.station_disconnected(owner),
            Notice::SwitchShutdown => {
                warn!("Switch received its own shutdown notice, ignoring");
            }
        }
    }

    /// Forgets the station's address and frees its port.
    #[instrument(skip(self), fields(owner = %owner))]
    pub fn station_disconnected(&self, owner: OwnerId) {
        let Some((port, mac)) = self.fabric.registry().release_owner(owner) else {
            warn!("Disconnect from an owner that holds no port");
            return;
        };

        self.table.forget(&mac);
        self.fabric
            .registry()
            .logs()
            .get(port)
            .line(format!(
                "Station {} is disconnected from port - {}",
                mac, port
            ));
        info!(%port, %mac, "Station left");
    }

    /// Tells every attached station the switch is closing. Each owner is
    /// addressed once. Returns the owners that were reached.
    pub fn notify_shutdown(&self) -> Vec<OwnerId> {
        let registry = self.fabric.registry();
        let mut notified = Vec::new();

        for (port, conn) in registry.connections() {
            match self
                .fabric
                .directory()
                .notify(conn.owner, Notice::SwitchShutdown)
            {
                Ok(()) => {
                    registry.logs().get(port).line(format!(
                        "Switch shutdown is notified to station {}",
                        conn.mac
                    ));
                    notified.push(conn.owner);
                }
                Err(e) => warn!(%port, owner = %conn.owner, error = %e, "Failed to notify station"),
            }
        }
        notified
    }

    /// Mailbox loop. Ends on cancellation or when the mailbox is dropped.
    pub async fn run(self, mut mailbox: NoticeReceiver, cancel: CancellationToken) {
        debug!("Lifecycle task started");
        loop {
            let notice = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                notice = mailbox.recv() => match notice {
                    Some(notice) => notice,
                    None => break,
                },
            };
            self.handle(notice);
        }
        debug!("Lifecycle task stopped");
    }
}
