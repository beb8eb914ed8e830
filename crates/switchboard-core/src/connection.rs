//! A registered client connection as seen by the hub.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use switchboard_protocol::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{trace, warn};

use crate::metrics;

/// Receiving end of a connection's outbound queue, drained by the write pump.
pub type Outbox = mpsc::Receiver<Bytes>;

/// Result of offering a frame to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was queued.
    Queued,
    /// The queue was full and the frame was dropped.
    Dropped,
    /// The connection is gone.
    Closed,
}

/// A client connection.
///
/// The group list is only ever written by
/// [`GroupRegistry`](crate::groups::GroupRegistry) while it holds its own
/// write lock, so it always matches the groups the connection is filed
/// under.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: String,
    /// Sorted, deduplicated group IDs.
    groups: RwLock<Vec<String>>,
    outbound: mpsc::Sender<Bytes>,
    closed: CancellationToken,
}

impl Connection {
    /// Create a connection with an outbound queue of `capacity` frames.
    #[must_use]
    pub fn new(user_id: impl Into<String>, capacity: usize) -> (Arc<Self>, Outbox) {
        Self::with_id(ConnectionId::generate(), user_id, capacity)
    }

    /// Create a connection with a known ID.
    #[must_use]
    pub fn with_id(
        id: ConnectionId,
        user_id: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, Outbox) {
        let (outbound, outbox) = mpsc::channel(capacity.max(1));
        let connection = Arc::new(Self {
            id,
            user_id: user_id.into(),
            groups: RwLock::new(Vec::new()),
            outbound,
            closed: CancellationToken::new(),
        });
        (connection, outbox)
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Get the owning user's ID.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Snapshot of the connection's groups, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        self.groups.read().clone()
    }

    /// Check whether the connection currently belongs to `group_id`.
    #[must_use]
    pub fn is_member(&self, group_id: &str) -> bool {
        self.groups
            .read()
            .binary_search_by(|g| g.as_str().cmp(group_id))
            .is_ok()
    }

    pub(crate) fn replace_groups(&self, groups: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut *self.groups.write(), groups)
    }

    /// Offer a frame to the outbound queue without waiting.
    ///
    /// A full queue drops the new frame so one slow reader cannot hold up
    /// fanout to the rest of its group.
    pub fn deliver(&self, frame: Bytes) -> Delivery {
        match self.outbound.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %self.id, "Outbound queue full, dropping frame");
                metrics::record_dropped("queue_full");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(connection = %self.id, "Outbound queue closed");
                Delivery::Closed
            }
        }
    }

    /// Start tearing the connection down. Both pumps observe this.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Check whether teardown has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait until teardown starts.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_creation() {
        let (conn, _outbox) = Connection::new("alice", 8);
        assert_eq!(conn.user_id(), "alice");
        assert!(conn.groups().is_empty());
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_is_member_uses_sorted_groups() {
        let (conn, _outbox) = Connection::new("alice", 8);
        conn.replace_groups(vec!["a".into(), "c".into(), "m".into()]);

        assert!(conn.is_member("c"));
        assert!(!conn.is_member("b"));
        assert!(!conn.is_member(""));
    }

    #[test]
    fn test_deliver_drops_when_full() {
        let (conn, mut outbox) = Connection::new("alice", 1);

        assert_eq!(conn.deliver(Bytes::from_static(b"1")), Delivery::Queued);
        assert_eq!(conn.deliver(Bytes::from_static(b"2")), Delivery::Dropped);

        assert_eq!(outbox.try_recv().unwrap(), "1");
        assert!(outbox.try_recv().is_err());
    }

    #[test]
    fn test_deliver_after_outbox_dropped() {
        let (conn, outbox) = Connection::new("alice", 4);
        drop(outbox);
        assert_eq!(conn.deliver(Bytes::from_static(b"x")), Delivery::Closed);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let (conn, _outbox) = Connection::new("alice", 4);
        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.closed().await })
        };

        conn.close();
        conn.close();
        waiter.await.unwrap();
        assert!(conn.is_closed());
    }
}
