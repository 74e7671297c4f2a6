//! ForwardingEngine - the per-port receive loop.
//!
//! For every frame received on port `p`:
//!
//! 1. Decode source and destination from their fixed offsets.
//! 2. Learn the source on `p` if the address is not yet in the table.
//! 3. Decide, in priority order: broadcast flood, known unicast, unknown
//!    unicast flood.
//! 4. Deliver to each chosen port while holding that port's send permit.
//!
//! Nothing escapes a port task: policy drops and failed deliveries are
//! written to the ingress port's log and the loop moves on. Only teardown
//! (cancellation or closed permits) ends the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use l2sim_common::{Direction, Fabric, PortLog, SimError, SimResult};
use l2sim_types::{Frame, MacAddress, PortId, WireFrame};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mac_table::MacLearningTable;

/// Why a frame is flooded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodReason {
    Broadcast,
    UnknownUnicast,
}

/// Why a frame is not delivered anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The frame could not be decoded.
    Malformed,
    /// The ingress port itself is disabled.
    IngressDisabled,
    /// The destination was learned on the ingress port.
    SamePort,
    /// The learned destination port is disabled.
    PortDisabled(PortId),
    /// The learned destination port has no station.
    NotConnected(PortId),
}

/// Outcome of the forwarding decision for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Deliver to every eligible port except the ingress port.
    Flood {
        reason: FloodReason,
        targets: Vec<PortId>,
    },
    /// Deliver to one learned port.
    Unicast(PortId),
    Drop(DropReason),
}

impl Decision {
    /// Ports the frame is handed to.
    pub fn targets(&self) -> Vec<PortId> {
        match self {
            Decision::Flood { targets, .. } => targets.clone(),
            Decision::Unicast(port) => vec![*port],
            Decision::Drop(_) => Vec::new(),
        }
    }
}

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardingStats {
    pub frames_received: u64,
    pub frames_flooded: u64,
    pub frames_unicast: u64,
    pub frames_dropped: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    /// Frames whose every delivery attempt has finished.
    pub frames_processed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_flooded: AtomicU64,
    frames_unicast: AtomicU64,
    frames_dropped: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    frames_processed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ForwardingStats {
        ForwardingStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_flooded: self.frames_flooded.load(Ordering::Relaxed),
            frames_unicast: self.frames_unicast.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
        }
    }
}

/// Learning and forwarding over a fabric. Cheap to clone; one clone runs
/// per port task.
#[derive(Debug, Clone)]
pub struct ForwardingEngine {
    fabric: Arc<Fabric>,
    table: Arc<MacLearningTable>,
    counters: Arc<Counters>,
}

impl ForwardingEngine {
    pub fn new(fabric: Arc<Fabric>, table: Arc<MacLearningTable>) -> Self {
        Self {
            fabric,
            table,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> ForwardingStats {
        self.counters.snapshot()
    }

    fn log(&self, port: PortId) -> &PortLog {
        self.fabric.registry().logs().get(port)
    }

    /// Ports other than `ingress` that are enabled and have a station.
    fn flood_targets(&self, ingress: PortId) -> Vec<PortId> {
        self.fabric
            .registry()
            .snapshot()
            .into_iter()
            .filter(|(port, slot)| *port != ingress && slot.enabled && slot.connection.is_some())
            .map(|(port, _)| port)
            .collect()
    }

    /// Chooses where a frame received on `ingress` goes, from the current
    /// table and port state. Does not learn.
    pub fn decide(&self, ingress: PortId, destination: &MacAddress) -> Decision {
        if destination.is_broadcast() {
            return Decision::Flood {
                reason: FloodReason::Broadcast,
                targets: self.flood_targets(ingress),
            };
        }

        match self.table.lookup(destination) {
            Some(port) if port == ingress => Decision::Drop(DropReason::SamePort),
            Some(port) => {
                let slot = self.fabric.segment().slot(port);
                if !slot.enabled {
                    Decision::Drop(DropReason::PortDisabled(port))
                } else if slot.connection.is_none() {
                    Decision::Drop(DropReason::NotConnected(port))
                } else {
                    Decision::Unicast(port)
                }
            }
            None => Decision::Flood {
                reason: FloodReason::UnknownUnicast,
                targets: self.flood_targets(ingress),
            },
        }
    }

    /// Handles one frame received on `ingress`.
    ///
    /// Returns the decision taken. An error means the fabric is going away
    /// and the port task should stop.
    pub async fn process(
        &self,
        ingress: PortId,
        wire: WireFrame,
        cancel: &CancellationToken,
    ) -> SimResult<Decision> {
        let decision = self.handle(ingress, wire, cancel).await?;
        Counters::bump(&self.counters.frames_processed);
        Ok(decision)
    }

    async fn handle(
        &self,
        ingress: PortId,
        wire: WireFrame,
        cancel: &CancellationToken,
    ) -> SimResult<Decision> {
        Counters::bump(&self.counters.frames_received);
        let log = self.log(ingress);

        let frame = match wire.decode() {
            Ok(frame) => frame,
            Err(e) => {
                log.line(format!(
                    "Frame received on port - {} is dropped: {}",
                    ingress, e
                ));
                Counters::bump(&self.counters.frames_dropped);
                return Ok(Decision::Drop(DropReason::Malformed));
            }
        };

        log.line(format!(
            "Frame received on port - {} : {} -> {} : {}",
            ingress,
            frame.source,
            frame.destination,
            frame.payload_text()
        ));

        if !self.fabric.registry().is_enabled(ingress) {
            log.line(format!(
                "Frame is dropped: port - {} is disabled",
                ingress
            ));
            Counters::bump(&self.counters.frames_dropped);
            return Ok(Decision::Drop(DropReason::IngressDisabled));
        }

        if self.table.learn_if_unknown(frame.source, ingress) {
            log.line(format!(
                "MAC {} is learned on port - {}",
                frame.source, ingress
            ));
        }

        let decision = self.decide(ingress, &frame.destination);
        self.record(ingress, &frame, &decision);

        for port in decision.targets() {
            self.deliver(ingress, port, wire, cancel).await?;
        }

        Ok(decision)
    }

    fn record(&self, ingress: PortId, frame: &Frame, decision: &Decision) {
        let log = self.log(ingress);
        match decision {
            Decision::Flood { reason, targets } => {
                Counters::bump(&self.counters.frames_flooded);
                match reason {
                    FloodReason::Broadcast => log.line("Broadcasting the frame"),
                    FloodReason::UnknownUnicast => log.line(format!(
                        "Unknown Unicast the frame to {}",
                        frame.destination
                    )),
                }
                if targets.is_empty() {
                    log.line("No port is enabled or connected to a station, frame is not forwarded");
                }
            }
            Decision::Unicast(port) => {
                Counters::bump(&self.counters.frames_unicast);
                log.line(format!("Unicast the frame to port - {}", port));
            }
            Decision::Drop(reason) => {
                Counters::bump(&self.counters.frames_dropped);
                let why = match reason {
                    DropReason::SamePort => format!("{} is on the ingress port", frame.destination),
                    DropReason::PortDisabled(port) => format!("port - {} is disabled", port),
                    DropReason::NotConnected(port) => {
                        format!("port - {} is not connected to a station", port)
                    }
                    DropReason::Malformed => "malformed frame".to_string(),
                    DropReason::IngressDisabled => format!("port - {} is disabled", ingress),
                };
                log.line(format!(
                    "Frame to {} is dropped: {}",
                    frame.destination, why
                ));
            }
        }
    }

    /// Writes one copy of the frame to `port`. Failures other than teardown
    /// abandon only this delivery.
    async fn deliver(
        &self,
        ingress: PortId,
        port: PortId,
        wire: WireFrame,
        cancel: &CancellationToken,
    ) -> SimResult<()> {
        match self
            .fabric
            .send(port, Direction::Outbound, wire, cancel)
            .await
        {
            Ok(()) => {
                Counters::bump(&self.counters.deliveries);
                self.log(ingress)
                    .line(format!("Frame is forwarded to port - {}", port));
                Ok(())
            }
            Err(e) if e.is_teardown() => Err(e),
            Err(e) => {
                Counters::bump(&self.counters.delivery_failures);
                warn!(%ingress, %port, error = %e, "Delivery failed");
                self.log(ingress).line(format!(
                    "Failed to forward the frame to port - {}: {}",
                    port, e
                ));
                Ok(())
            }
        }
    }

    /// Receive loop for one port. Runs until `cancel` fires or the fabric is
    /// torn down.
    pub async fn run_port(self, port: PortId, cancel: CancellationToken) {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            rx = self.fabric.open_receiver(port, Direction::Inbound) => rx,
        };
        info!(%port, "Port task started");

        loop {
            let wire = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(wire) => wire,
                    Err(e) => {
                        warn!(%port, error = %e, "Inbound channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = self.process(port, wire, &cancel).await {
                match e {
                    SimError::Cancelled => {}
                    other => debug!(%port, error = %other, "Stopping on teardown"),
                }
                break;
            }
        }

        info!(%port, "Port task stopped");
    }
}
