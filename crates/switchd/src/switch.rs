//! The switch supervisor: owns the learning table, one forwarding task per
//! port and the lifecycle task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use l2sim_common::{Fabric, OwnerId, PortRegistry, SimConfig, SimError, SimResult};
use l2sim_types::PortId;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::forwarding::{ForwardingEngine, ForwardingStats};
use crate::lifecycle::LifecycleHandler;
use crate::mac_table::MacLearningTable;

/// Start-up settings for a [`Switch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOptions {
    /// Enable every port on start.
    pub enabled_at_start: bool,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            enabled_at_start: true,
        }
    }
}

impl SwitchOptions {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            enabled_at_start: config.ports.enabled_at_start,
        }
    }
}

/// What a shutdown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Stations told about the shutdown, in port order.
    pub notified: Vec<OwnerId>,
}

/// A running switch.
pub struct Switch {
    owner: OwnerId,
    fabric: Arc<Fabric>,
    table: Arc<MacLearningTable>,
    engine: ForwardingEngine,
    lifecycle: LifecycleHandler,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Switch {
    /// Publishes the switch identity, initialises every port and spawns the
    /// port and lifecycle tasks. Must be called inside a tokio runtime.
    #[instrument(skip_all, fields(enabled_at_start = options.enabled_at_start))]
    pub fn start(fabric: Arc<Fabric>, options: SwitchOptions) -> SimResult<Self> {
        if fabric.is_torn_down() {
            return Err(SimError::internal("fabric has already been released"));
        }
        if let Some(running) = fabric.segment().switch_owner() {
            return Err(SimError::internal(format!(
                "switch {} already owns this fabric",
                running
            )));
        }

        let owner = fabric.allocate_owner();
        let mailbox = fabric.directory().register(owner);
        fabric.segment().publish_switch(owner);

        let registry = fabric.registry();
        for port in PortId::all() {
            registry.set_enabled(port, options.enabled_at_start);
            registry.disconnect(port);
        }

        let table = Arc::new(MacLearningTable::new());
        let engine = ForwardingEngine::new(Arc::clone(&fabric), Arc::clone(&table));
        let lifecycle = LifecycleHandler::new(Arc::clone(&fabric), Arc::clone(&table));
        let cancel = CancellationToken::new();

        let mut tasks: Vec<JoinHandle<()>> = PortId::all()
            .map(|port| tokio::spawn(engine.clone().run_port(port, cancel.child_token())))
            .collect();
        tasks.push(tokio::spawn(
            lifecycle.clone().run(mailbox, cancel.child_token()),
        ));

        info!(%owner, "Switch started");
        Ok(Self {
            owner,
            fabric,
            table,
            engine,
            lifecycle,
            cancel,
            tasks: Mutex::new(tasks),
            stopped: AtomicBool::new(false),
        })
    }

    /// Identity stations address their notices to.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    pub fn registry(&self) -> &PortRegistry {
        self.fabric.registry()
    }

    pub fn mac_table(&self) -> &MacLearningTable {
        &self.table
    }

    pub fn stats(&self) -> ForwardingStats {
        self.engine.stats()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Operator-initiated termination.
    ///
    /// Notifies every attached station, stops all tasks, drops the learning
    /// table and releases the fabric. Later calls do nothing.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        info!("TERMINATING SWITCH");

        // No station may attach after the fan-out has read the port table
        self.fabric.segment().begin_shutdown();
        let notified = self.lifecycle.notify_shutdown();

        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Switch task ended abnormally");
            }
        }

        self.table.clear();
        self.fabric.directory().unregister(self.owner);
        self.fabric.teardown();

        info!(stations = notified.len(), "Switch stopped");
        ShutdownReport { notified }
    }
}

impl Drop for Switch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("owner", &self.owner)
            .field("running", &self.is_running())
            .field("mac_entries", &self.table.len())
            .finish()
    }
}
