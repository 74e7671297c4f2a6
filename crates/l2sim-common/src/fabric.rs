//! The fabric: per-port channels, send permits, the shared segment and the
//! owner directory, bundled as the primitives both sides start from.
//!
//! Each port has two bounded channels. `Inbound` carries frames from the
//! station into the switch, `Outbound` carries frames from the switch to the
//! station. Every channel has a binary send permit; holders of the permit are
//! the only writers into that channel, so each write is atomic with respect
//! to other writers to the same destination.
//!
//! Receiving ends live in the fabric, not in a participant. A participant
//! takes one for as long as it is attached, and the next station on the same
//! port picks up the same channel, queued frames included.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use l2sim_types::{PortId, WireFrame, MAX_PORTS};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::notice::Directory;
use crate::port_log::{LogTarget, PortLogs};
use crate::registry::PortRegistry;
use crate::segment::{OwnerId, SharedSegment};

/// Direction of a port channel, seen from the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Station to switch.
    Inbound,
    /// Switch to station.
    Outbound,
}

#[derive(Debug)]
struct Channel {
    tx: mpsc::Sender<WireFrame>,
    rx: Arc<AsyncMutex<mpsc::Receiver<WireFrame>>>,
    permit: Semaphore,
    depth: usize,
}

impl Channel {
    fn new(depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth);
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            permit: Semaphore::new(1),
            depth,
        }
    }

    fn close(&self) {
        self.permit.close();
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

#[derive(Debug)]
struct PortLink {
    inbound: Channel,
    outbound: Channel,
}

impl PortLink {
    fn channel(&self, direction: Direction) -> &Channel {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }
}

/// Settings used to build a [`Fabric`].
#[derive(Debug, Clone)]
pub struct FabricOptions {
    pub channel_depth: usize,
    pub send_timeout: Option<Duration>,
    pub logs: LogTarget,
}

impl Default for FabricOptions {
    fn default() -> Self {
        Self {
            channel_depth: 5,
            send_timeout: None,
            logs: LogTarget::Discard,
        }
    }
}

impl FabricOptions {
    /// Derives fabric settings from the loaded configuration.
    pub fn from_config(config: &SimConfig) -> Self {
        let logs = if config.logging.port_files {
            LogTarget::Files(config.logging.dir.clone())
        } else {
            LogTarget::Discard
        };
        Self {
            channel_depth: config.ports.channel_depth,
            send_timeout: config.send_timeout(),
            logs,
        }
    }
}

/// Shared primitives for one switch and its stations.
#[derive(Debug)]
pub struct Fabric {
    segment: Arc<SharedSegment>,
    registry: PortRegistry,
    directory: Directory,
    links: Vec<PortLink>,
    next_owner: AtomicU32,
    send_timeout: Option<Duration>,
    log_target: LogTarget,
}

impl Fabric {
    /// Allocates the segment, the channels, the permits and the switch-side
    /// port logs.
    pub fn bootstrap(options: FabricOptions) -> SimResult<Arc<Self>> {
        if options.channel_depth == 0 {
            return Err(SimError::invalid_config("channel_depth", "must be > 0"));
        }

        let segment = Arc::new(SharedSegment::new());
        let logs = Arc::new(PortLogs::open(&options.logs)?);
        let links = (0..MAX_PORTS)
            .map(|_| PortLink {
                inbound: Channel::new(options.channel_depth),
                outbound: Channel::new(options.channel_depth),
            })
            .collect();

        info!(
            depth = options.channel_depth,
            send_timeout = ?options.send_timeout,
            "Fabric ready"
        );

        Ok(Arc::new(Self {
            registry: PortRegistry::new(Arc::clone(&segment), logs),
            segment,
            directory: Directory::new(),
            links,
            next_owner: AtomicU32::new(1),
            send_timeout: options.send_timeout,
            log_target: options.logs,
        }))
    }

    pub fn segment(&self) -> &SharedSegment {
        &self.segment
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Where station logs should be opened.
    pub fn log_target(&self) -> &LogTarget {
        &self.log_target
    }

    /// Hands out a fresh participant identity.
    pub fn allocate_owner(&self) -> OwnerId {
        loop {
            let raw = self.next_owner.fetch_add(1, Ordering::Relaxed);
            if let Some(owner) = OwnerId::new(raw) {
                return owner;
            }
        }
    }

    /// Writes `frame` into the channel while holding its send permit.
    ///
    /// Without a configured timeout a full channel blocks until the reader
    /// drains it. Cancelling `cancel` abandons the attempt at any point.
    pub async fn send(
        &self,
        port: PortId,
        direction: Direction,
        frame: WireFrame,
        cancel: &CancellationToken,
    ) -> SimResult<()> {
        let channel = self.links[port.index()].channel(direction);

        let deliver = async {
            let _permit = channel
                .permit
                .acquire()
                .await
                .map_err(|_| SimError::PermitClosed { port })?;

            match self.send_timeout {
                None => channel
                    .tx
                    .send(frame)
                    .await
                    .map_err(|_| SimError::ChannelClosed { port }),
                Some(limit) => match tokio::time::timeout(limit, channel.tx.send(frame)).await {
                    Ok(sent) => sent.map_err(|_| SimError::ChannelClosed { port }),
                    Err(_) => Err(SimError::DeliveryTimeout { port, waited: limit }),
                },
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SimError::Cancelled),
            sent = deliver => sent,
        }
    }

    /// Takes the receiving end of a channel, waiting for any previous holder
    /// to let go.
    pub async fn open_receiver(&self, port: PortId, direction: Direction) -> ChannelReceiver {
        let rx = Arc::clone(&self.links[port.index()].channel(direction).rx);
        let guard = rx.lock_owned().await;
        debug!(%port, ?direction, "Opened channel receiver");
        ChannelReceiver { port, guard }
    }

    /// Frames currently queued in a channel.
    pub fn queued(&self, port: PortId, direction: Direction) -> usize {
        let channel = self.links[port.index()].channel(direction);
        channel.depth - channel.tx.capacity()
    }

    /// Returns true once [`Fabric::teardown`] has run.
    pub fn is_torn_down(&self) -> bool {
        self.links.iter().all(|l| l.inbound.permit.is_closed())
    }

    /// Releases everything: permits are closed so later sends fail, queued
    /// frames are discarded, mailboxes are dropped and the segment is zeroed.
    pub fn teardown(&self) {
        for link in &self.links {
            link.inbound.close();
            link.outbound.close();
        }
        self.directory.clear();
        self.segment.reset();
        self.registry.logs().close_all();
        info!("Fabric released");
    }
}

/// Exclusive receiving end of one port channel.
#[derive(Debug)]
pub struct ChannelReceiver {
    port: PortId,
    guard: OwnedMutexGuard<mpsc::Receiver<WireFrame>>,
}

impl ChannelReceiver {
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Waits for the next frame.
    pub async fn recv(&mut self) -> SimResult<WireFrame> {
        self.guard
            .recv()
            .await
            .ok_or(SimError::ChannelClosed { port: self.port })
    }

    /// Takes a frame if one is queued.
    pub fn try_recv(&mut self) -> Option<WireFrame> {
        self.guard.try_recv().ok()
    }
}
