//! StationAgent - one end station bound to one switch port.
//!
//! A connected station runs two tasks: the receive task, which reads the
//! port's outbound channel and keeps only frames addressed to this station
//! or to everyone, and the notice task, which waits for `SwitchShutdown`.
//! Sending happens on the caller's task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use l2sim_common::{
    station_log_name, ChannelReceiver, Direction, Fabric, Notice, NoticeReceiver, OwnerId,
    PortLog, SimError, SimResult,
};
use l2sim_types::{Frame, MacAddress, PortId, WireFrame};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Payload used when the operator does not give one.
pub const DEFAULT_PAYLOAD: &str = "*** THIS IS DATA ***";

/// How many accepted frames a station keeps for inspection.
pub const RECEIVED_HISTORY: usize = 256;

/// Why a station stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationExit {
    /// The operator asked the station to leave.
    Left,
    /// The switch announced its shutdown.
    SwitchClosed,
}

/// What the receive filter did with one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    Accepted(Frame),
    Discarded,
    Malformed,
}

struct Inner {
    owner: OwnerId,
    mac: MacAddress,
    port: PortId,
    fabric: Arc<Fabric>,
    log: PortLog,
    stop: CancellationToken,
    closed: CancellationToken,
    exit: Mutex<Option<StationExit>>,
    received: Mutex<VecDeque<Frame>>,
    accepted: AtomicU64,
    discarded: AtomicU64,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn filter(&self, wire: &WireFrame) -> Reception {
        let frame = match wire.decode() {
            Ok(frame) => frame,
            Err(e) => {
                self.log.line(format!(
                    "Frame received on port - {} is discarded: {}",
                    self.port, e
                ));
                return Reception::Malformed;
            }
        };

        self.log.line(format!(
            "Frame received on port - {}. Frame's Destination address is {}, Frame's Source Address is {}",
            self.port, frame.destination, frame.source
        ));

        if frame.is_broadcast() || frame.destination == self.mac {
            self.log.line(format!(
                "Frame with Dest - {}, Src - {} is accepted : {}",
                frame.destination,
                frame.source,
                frame.payload_text()
            ));
            {
                let mut received = self.received.lock();
                if received.len() == RECEIVED_HISTORY {
                    received.pop_front();
                }
                received.push_back(frame.clone());
            }
            self.accepted.fetch_add(1, Ordering::Relaxed);
            Reception::Accepted(frame)
        } else {
            self.log.line("Frame is discarded");
            self.discarded.fetch_add(1, Ordering::Relaxed);
            Reception::Discarded
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut rx: ChannelReceiver = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return,
            rx = self.fabric.open_receiver(self.port, Direction::Outbound) => rx,
        };
        debug!(port = %self.port, mac = %self.mac, "Receive task started");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(wire) => {
                        self.filter(&wire);
                    }
                    Err(e) => {
                        warn!(port = %self.port, error = %e, "Receive channel closed");
                        break;
                    }
                },
            }
        }
        debug!(port = %self.port, mac = %self.mac, "Receive task stopped");
    }

    async fn notice_loop(self: Arc<Self>, mut mailbox: NoticeReceiver) {
        loop {
            let notice = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                notice = mailbox.recv() => notice,
            };
            match notice {
                Some(Notice::SwitchShutdown) => {
                    if self.close(StationExit::SwitchClosed).await {
                        self.closed.cancel();
                    }
                    break;
                }
                Some(other) => warn!(port = %self.port, notice = ?other, "Unexpected notice"),
                None => break,
            }
        }
    }

    /// Records why the station stopped. Only the first caller gets `true`.
    fn claim_exit(&self, exit: StationExit) -> bool {
        let mut slot = self.exit.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(exit);
        true
    }

    /// Stops the receive task and finalizes the log. Only the first caller
    /// does anything; it gets `true`.
    async fn close(&self, exit: StationExit) -> bool {
        if !self.claim_exit(exit) {
            return false;
        }

        if exit == StationExit::SwitchClosed {
            self.log.line("SWITCH IS CLOSED");
            info!(port = %self.port, mac = %self.mac, "SWITCH IS CLOSED");
        }

        self.stop.cancel();
        let receive_task = self.receive_task.lock().take();
        if let Some(task) = receive_task {
            if let Err(e) = task.await {
                error!(port = %self.port, error = %e, "Receive task ended abnormally");
            }
        }

        self.finish();
        true
    }

    /// Writes the log trailer and drops the station's mailbox.
    fn finish(&self) {
        self.log.line(format!(
            "***** STATION WITH MAC ADDRESS - {} IS DISCONNECTED FROM PORT - {} *****",
            self.mac, self.port
        ));
        self.log.close();
        self.fabric.directory().unregister(self.owner);
    }

    /// Sends `StationDisconnect` to the published switch.
    fn notify_switch(&self) -> SimResult<()> {
        let switch = self
            .fabric
            .segment()
            .switch_owner()
            .ok_or(SimError::SwitchAbsent)?;
        self.fabric
            .directory()
            .notify(switch, Notice::StationDisconnect { owner: self.owner })
    }
}

/// A station attached to a switch port.
pub struct StationAgent {
    inner: Arc<Inner>,
    notice_task: Mutex<Option<JoinHandle<()>>>,
}

impl StationAgent {
    /// Attaches a station with address `mac` to `port`.
    ///
    /// Fails if no switch is running or it is shutting down, or if the port
    /// is disabled or already taken. Must be called inside a tokio runtime.
    #[instrument(skip(fabric), fields(mac = %mac, port = %port))]
    pub fn connect(fabric: Arc<Fabric>, mac: MacAddress, port: PortId) -> SimResult<Self> {
        let owner = fabric.allocate_owner();
        let mailbox = fabric.directory().register(owner);

        if let Err(e) = fabric.registry().attach(port, owner, mac) {
            fabric.directory().unregister(owner);
            return Err(e);
        }

        let log = match PortLog::open(fabric.log_target(), &station_log_name(port), port) {
            Ok(log) => log,
            Err(e) => {
                fabric.registry().release_owner(owner);
                fabric.directory().unregister(owner);
                return Err(e);
            }
        };
        log.line(format!(
            "  STATION WITH MAC ADDRESS - {} IS CONNECTED ON PORT - {}",
            mac, port
        ));

        let inner = Arc::new(Inner {
            owner,
            mac,
            port,
            fabric,
            log,
            stop: CancellationToken::new(),
            closed: CancellationToken::new(),
            exit: Mutex::new(None),
            received: Mutex::new(VecDeque::with_capacity(RECEIVED_HISTORY)),
            accepted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            receive_task: Mutex::new(None),
        });

        let receive_task = tokio::spawn(Arc::clone(&inner).receive_loop());
        *inner.receive_task.lock() = Some(receive_task);
        let notice_task = tokio::spawn(Arc::clone(&inner).notice_loop(mailbox));

        info!(%owner, "Station connected");
        Ok(Self {
            inner,
            notice_task: Mutex::new(Some(notice_task)),
        })
    }

    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    pub fn mac(&self) -> MacAddress {
        self.inner.mac
    }

    pub fn port(&self) -> PortId {
        self.inner.port
    }

    /// The station's own log stream.
    pub fn log(&self) -> &PortLog {
        &self.inner.log
    }

    /// The most recent accepted frames, oldest first. At most
    /// [`RECEIVED_HISTORY`] are kept.
    pub fn received(&self) -> Vec<Frame> {
        self.inner.received.lock().iter().cloned().collect()
    }

    /// Number of frames accepted since connecting.
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Number of frames dropped by the address filter.
    pub fn discarded(&self) -> u64 {
        self.inner.discarded.load(Ordering::Relaxed)
    }

    pub fn exit(&self) -> Option<StationExit> {
        *self.inner.exit.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Waits until the station has stopped and reports why.
    pub async fn wait_closed(&self) -> StationExit {
        self.inner.closed.cancelled().await;
        self.exit().unwrap_or(StationExit::Left)
    }

    /// Sends a frame to `destination` through the station's port.
    ///
    /// Refused while the port is disabled. Blocks while the port's inbound
    /// channel is full, unless the fabric has a send timeout.
    pub async fn send(&self, destination: MacAddress, payload: impl Into<Vec<u8>>) -> SimResult<()> {
        let inner = &self.inner;
        if inner.stop.is_cancelled() {
            return Err(SimError::Cancelled);
        }
        if !inner.fabric.registry().is_enabled(inner.port) {
            return Err(SimError::PortDisabled { port: inner.port });
        }

        let frame = Frame::new(inner.mac, destination, payload)?;
        inner
            .fabric
            .send(inner.port, Direction::Inbound, frame.encode(), &inner.stop)
            .await?;

        inner.log.line(format!(
            "Frame with destination mac address - {}, source mac address - {} has been sent from station-{}",
            destination, inner.mac, inner.port
        ));
        Ok(())
    }

    /// Voluntary exit: stops receiving, closes the log, then tells the
    /// switch so it can forget this station.
    #[instrument(skip(self), fields(mac = %self.inner.mac, port = %self.inner.port))]
    pub async fn leave(&self) -> SimResult<()> {
        let inner = &self.inner;
        if !inner.close(StationExit::Left).await {
            return Ok(());
        }

        let notice_task = self.notice_task.lock().take();
        if let Some(task) = notice_task {
            if let Err(e) = task.await {
                error!(error = %e, "Notice task ended abnormally");
            }
        }

        let notified = inner.notify_switch();
        inner.closed.cancel();

        match notified {
            Ok(()) => {
                info!("Station left");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Could not tell the switch about the disconnect");
                Err(e)
            }
        }
    }
}

/// Dropping a station that is still attached detaches it like `leave`,
/// without waiting for its tasks.
impl Drop for StationAgent {
    fn drop(&mut self) {
        let inner = &self.inner;
        inner.stop.cancel();
        if !inner.claim_exit(StationExit::Left) {
            return;
        }

        inner.finish();
        if let Err(e) = inner.notify_switch() {
            debug!(port = %inner.port, error = %e, "Switch unreachable, releasing the port directly");
            inner.fabric.registry().release_owner(inner.owner);
        }
        inner.closed.cancel();
    }
}

impl std::fmt::Debug for StationAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationAgent")
            .field("owner", &self.inner.owner)
            .field("mac", &self.inner.mac)
            .field("port", &self.inner.port)
            .field("exit", &self.exit())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2sim_common::{FabricOptions, LogTarget};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const A: &str = "AA:AA:AA:AA:AA:AA";
    const B: &str = "BB:BB:BB:BB:BB:BB";

    fn port(n: u8) -> PortId {
        PortId::new(n).unwrap()
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    /// A fabric with a published switch identity and ports 1-2 enabled.
    /// Returns the switch mailbox so tests can see station notices.
    fn fabric(logs: LogTarget) -> (Arc<Fabric>, NoticeReceiver) {
        let fabric = Fabric::bootstrap(FabricOptions {
            logs,
            ..Default::default()
        })
        .unwrap();
        let switch = fabric.allocate_owner();
        let mailbox = fabric.directory().register(switch);
        fabric.segment().publish_switch(switch);
        fabric.registry().set_enabled(port(1), true);
        fabric.registry().set_enabled(port(2), true);
        (fabric, mailbox)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn deliver(fabric: &Fabric, to: u8, src: &str, dst: &str) {
        let frame = Frame::new(mac(src), mac(dst), b"payload".to_vec())
            .unwrap()
            .encode();
        fabric
            .send(port(to), Direction::Outbound, frame, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_registers_station() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        assert_eq!(fabric.registry().is_connected(port(1)), Some(station.owner()));
        assert_eq!(fabric.registry().find_mac_by_owner(station.owner()), Some(mac(A)));
        assert!(station.log().contains("IS CONNECTED ON PORT - 1"));
        assert!(!station.is_closed());
    }

    #[tokio::test]
    async fn test_connect_refuses_disabled_port() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let err = StationAgent::connect(Arc::clone(&fabric), mac(A), port(3)).unwrap_err();
        assert!(matches!(err, SimError::PortDisabled { .. }));
        assert_eq!(fabric.registry().is_connected(port(3)), None);
    }

    #[tokio::test]
    async fn test_connect_refuses_occupied_port() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let _first = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        let err = StationAgent::connect(Arc::clone(&fabric), mac(B), port(1)).unwrap_err();
        assert!(matches!(err, SimError::PortOccupied { .. }));
    }

    #[tokio::test]
    async fn test_connect_requires_switch() {
        let fabric = Fabric::bootstrap(FabricOptions::default()).unwrap();
        let err = StationAgent::connect(fabric, mac(A), port(1)).unwrap_err();
        assert!(matches!(err, SimError::SwitchAbsent));
    }

    #[tokio::test]
    async fn test_receive_filter() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        deliver(&fabric, 1, B, A).await;
        deliver(&fabric, 1, B, "FF:FF:FF:FF:FF:FF").await;
        deliver(&fabric, 1, B, "CC:CC:CC:CC:CC:CC").await;

        wait_until(|| station.received().len() == 2 && station.discarded() == 1).await;
        let received = station.received();
        assert_eq!(received[0].destination, mac(A));
        assert!(received[1].is_broadcast());
        assert_eq!(station.log().count("is accepted"), 2);
        assert_eq!(station.log().count("Frame is discarded"), 1);
    }

    #[tokio::test]
    async fn test_filter_outcomes() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        let garbage = WireFrame::from_slice(&[0u8; 100]).unwrap();
        assert_eq!(station.inner.filter(&garbage), Reception::Malformed);

        let stranger = Frame::new(mac(B), mac("CC:CC:CC:CC:CC:CC"), Vec::new()).unwrap();
        assert_eq!(station.inner.filter(&stranger.encode()), Reception::Discarded);

        let mine = Frame::new(mac(B), mac(A), b"hi".to_vec()).unwrap();
        assert_eq!(station.inner.filter(&mine.encode()), Reception::Accepted(mine));
    }

    #[tokio::test]
    async fn test_send_writes_to_inbound_channel() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        station.send(mac(B), DEFAULT_PAYLOAD).await.unwrap();

        let mut rx = fabric.open_receiver(port(1), Direction::Inbound).await;
        let frame = rx.recv().await.unwrap().decode().unwrap();
        assert_eq!(frame.source, mac(A));
        assert_eq!(frame.destination, mac(B));
        assert_eq!(frame.payload_text(), DEFAULT_PAYLOAD);
        assert!(station.log().contains("has been sent from station-1"));
    }

    #[tokio::test]
    async fn test_send_refused_on_disabled_port() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        fabric.registry().set_enabled(port(1), false);

        let err = station.send(mac(B), "x").await.unwrap_err();
        assert!(matches!(err, SimError::PortDisabled { .. }));
        assert_eq!(fabric.queued(port(1), Direction::Inbound), 0);
    }

    #[tokio::test]
    async fn test_leave_notifies_switch() {
        let (fabric, mut mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(B), port(2)).unwrap();

        station.leave().await.unwrap();

        assert_eq!(
            mailbox.recv().await,
            Some(Notice::StationDisconnect {
                owner: station.owner()
            })
        );
        assert_eq!(station.wait_closed().await, StationExit::Left);
        assert!(station.log().contains("IS DISCONNECTED FROM PORT - 2"));
        assert!(matches!(
            station.send(mac(A), "late").await,
            Err(SimError::Cancelled)
        ));

        // A second leave is a no-op
        station.leave().await.unwrap();
        assert!(mailbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switch_shutdown_closes_station() {
        let (fabric, mut mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        fabric
            .directory()
            .notify(station.owner(), Notice::SwitchShutdown)
            .unwrap();

        assert_eq!(station.wait_closed().await, StationExit::SwitchClosed);
        assert!(station.log().contains("SWITCH IS CLOSED"));
        assert!(!fabric.directory().is_registered(station.owner()));

        // The station does not answer a shutdown
        station.leave().await.unwrap();
        assert!(mailbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_port_is_reusable_after_leave() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let first = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        first.leave().await.unwrap();
        fabric.registry().disconnect(port(1));

        let second = StationAgent::connect(Arc::clone(&fabric), mac(B), port(1)).unwrap();
        deliver(&fabric, 1, A, B).await;
        wait_until(|| second.received().len() == 1).await;
    }

    #[tokio::test]
    async fn test_drop_tells_switch() {
        let (fabric, mut mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(B), port(2)).unwrap();
        let owner = station.owner();
        let inner = Arc::clone(&station.inner);

        drop(station);

        assert_eq!(
            mailbox.recv().await,
            Some(Notice::StationDisconnect { owner })
        );
        assert!(inner.log.contains("IS DISCONNECTED FROM PORT - 2"));
        assert!(inner.closed.is_cancelled());
        assert!(!fabric.directory().is_registered(owner));
    }

    #[tokio::test]
    async fn test_drop_frees_port_when_switch_unreachable() {
        let (fabric, mailbox) = fabric(LogTarget::Memory);
        drop(mailbox);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        assert!(fabric.registry().is_connected(port(1)).is_some());

        drop(station);

        assert_eq!(fabric.registry().is_connected(port(1)), None);
        let next = StationAgent::connect(Arc::clone(&fabric), mac(B), port(1)).unwrap();
        assert_eq!(fabric.registry().is_connected(port(1)), Some(next.owner()));
    }

    #[tokio::test]
    async fn test_drop_after_leave_sends_nothing_more() {
        let (fabric, mut mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        station.leave().await.unwrap();
        assert!(mailbox.recv().await.is_some());

        drop(station);
        assert!(mailbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_received_history_is_bounded() {
        let (fabric, _mailbox) = fabric(LogTarget::Memory);
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();

        for n in 0..RECEIVED_HISTORY + 10 {
            let frame = Frame::new(mac(B), mac(A), n.to_string()).unwrap();
            station.inner.filter(&frame.encode());
        }

        let received = station.received();
        assert_eq!(received.len(), RECEIVED_HISTORY);
        assert_eq!(received[0].payload_text(), "10");
        assert_eq!(station.accepted(), (RECEIVED_HISTORY + 10) as u64);
    }

    #[tokio::test]
    async fn test_file_log_has_banner_and_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let (fabric, _mailbox) = fabric(LogTarget::Files(dir.path().to_path_buf()));
        let station = StationAgent::connect(Arc::clone(&fabric), mac(A), port(1)).unwrap();
        station.leave().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("log_station1.txt")).unwrap();
        assert!(content.contains("Opened the file for logging data on"));
        assert!(content.contains("STATION WITH MAC ADDRESS - AA:AA:AA:AA:AA:AA IS CONNECTED ON PORT - 1"));
        assert!(content.contains("IS DISCONNECTED FROM PORT - 1"));
    }
}
