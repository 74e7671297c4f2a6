//! Lifecycle notices and the owner directory.
//!
//! Notices travel out-of-band from frame traffic. Each participant registers
//! a mailbox under its [`OwnerId`]; a notice is addressed by identity, the
//! way a signal is addressed to a process.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::segment::OwnerId;

/// A lifecycle notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Sent by a station to the switch when it leaves voluntarily.
    StationDisconnect {
        /// The departing station.
        owner: OwnerId,
    },
    /// Sent by the switch to every connected station when it shuts down.
    SwitchShutdown,
}

/// Receiving end of a participant's mailbox.
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

/// Owner identity to mailbox mapping.
#[derive(Debug, Default)]
pub struct Directory {
    mailboxes: Mutex<HashMap<OwnerId, mpsc::UnboundedSender<Notice>>>,
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mailbox for `owner`, replacing any previous one.
    pub fn register(&self, owner: OwnerId) -> NoticeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.lock().insert(owner, tx);
        debug!(%owner, "Registered mailbox");
        rx
    }

    /// Removes the mailbox for `owner`, if any.
    pub fn unregister(&self, owner: OwnerId) {
        if self.mailboxes.lock().remove(&owner).is_some() {
            debug!(%owner, "Unregistered mailbox");
        }
    }

    /// Returns true if `owner` has a live mailbox.
    pub fn is_registered(&self, owner: OwnerId) -> bool {
        self.mailboxes
            .lock()
            .get(&owner)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Delivers `notice` to `owner`. Never blocks.
    pub fn notify(&self, owner: OwnerId, notice: Notice) -> SimResult<()> {
        let mailboxes = self.mailboxes.lock();
        let tx = mailboxes
            .get(&owner)
            .ok_or(SimError::UnknownOwner { owner })?;
        tx.send(notice)
            .map_err(|_| SimError::UnknownOwner { owner })?;
        debug!(%owner, ?notice, "Delivered notice");
        Ok(())
    }

    /// Drops every mailbox.
    pub fn clear(&self) {
        self.mailboxes.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(n: u32) -> OwnerId {
        OwnerId::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_notify_registered_owner() {
        let directory = Directory::new();
        let mut rx = directory.register(owner(7));

        directory
            .notify(owner(7), Notice::StationDisconnect { owner: owner(9) })
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Notice::StationDisconnect { owner: owner(9) })
        );
    }

    #[test]
    fn test_notify_unknown_owner_fails() {
        let directory = Directory::new();
        let err = directory.notify(owner(3), Notice::SwitchShutdown).unwrap_err();
        assert!(matches!(err, SimError::UnknownOwner { .. }));
    }

    #[test]
    fn test_dropped_receiver_counts_as_unknown() {
        let directory = Directory::new();
        drop(directory.register(owner(4)));
        assert!(!directory.is_registered(owner(4)));
        assert!(directory.notify(owner(4), Notice::SwitchShutdown).is_err());
    }

    #[test]
    fn test_unregister_and_clear() {
        let directory = Directory::new();
        let _a = directory.register(owner(1));
        let _b = directory.register(owner(2));
        directory.unregister(owner(1));
        assert!(!directory.is_registered(owner(1)));
        assert!(directory.is_registered(owner(2)));
        directory.clear();
        assert!(!directory.is_registered(owner(2)));
    }
}
