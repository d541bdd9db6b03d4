//! Per-connection identity and the bounded outbound mailbox.

use std::sync::Arc;

use filehub_common::id::prefix;
use filehub_common::PrefixedId;
use tokio::sync::mpsc;

/// One serialized event, shared by every mailbox it is delivered to.
pub type Frame = Arc<str>;

/// Receiving end of a connection's mailbox, drained by the delivery pump.
pub type Mailbox = mpsc::Receiver<Frame>;

/// Identity of a single live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Process-unique connection identifier (`conn_` prefixed ULID).
    pub id: String,
    /// Principal the connection was authorized for.
    pub user_id: String,
    /// The file this connection watches.
    pub topic: String,
}

impl PrefixedId for ConnectionInfo {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionInfo {
    pub fn new(user_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: Self::generate(),
            user_id: user_id.into(),
            topic: topic.into(),
        }
    }
}

/// The hub-facing half of a connection: its identity plus the only sender
/// into its mailbox. Dropping it closes the mailbox.
#[derive(Debug)]
pub struct Subscriber {
    pub info: Arc<ConnectionInfo>,
    sender: mpsc::Sender<Frame>,
}

impl Subscriber {
    /// Enqueue without waiting.
    pub fn try_send(&self, frame: Frame) -> Result<(), mpsc::error::TrySendError<Frame>> {
        self.sender.try_send(frame)
    }
}

/// Create a mailbox of `capacity` frames for `info`.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn mailbox(info: Arc<ConnectionInfo>, capacity: usize) -> (Subscriber, Mailbox) {
    let (sender, receiver) = mpsc::channel(capacity);
    (Subscriber { info, sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

    #[test]
    fn connection_ids_are_prefixed_and_unique() {
        let a = ConnectionInfo::new("usr_1", "file-42");
        let b = ConnectionInfo::new("usr_1", "file-42");
        assert!(a.id.starts_with("conn_"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn full_mailbox_rejects_without_blocking() {
        let info = Arc::new(ConnectionInfo::new("usr_1", "file-42"));
        let (sub, mut rx) = mailbox(info, 1);

        sub.try_send(Arc::from("one")).unwrap();
        assert!(matches!(
            sub.try_send(Arc::from("two")),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(&*rx.try_recv().unwrap(), "one");
    }

    #[test]
    fn dropping_subscriber_closes_mailbox() {
        let info = Arc::new(ConnectionInfo::new("usr_1", "file-42"));
        let (sub, mut rx) = mailbox(info, 4);
        drop(sub);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}
