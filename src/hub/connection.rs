//! Hub-side connection handle and its bounded outbound mailbox.
//!
//! [`Connection::new`] splits one bounded `mpsc` channel into the producer
//! half kept by the hub ([`Connection`]) and the consumer half drained by
//! the session write loop ([`Mailbox`]). The hub holds the only sender, so
//! dropping the `Connection` closes the mailbox and the write loop sees
//! `None`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::{ChannelId, ConnectionId, Envelope};

/// Default number of envelopes a mailbox can hold before the connection
/// is considered a slow consumer.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The envelope was queued.
    Queued,
    /// The mailbox is at capacity.
    Full,
    /// The write loop has gone away.
    Closed,
}

/// Producer side of a session, owned by the hub.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_email: String,
    channel_id: Option<ChannelId>,
    sender: mpsc::Sender<Arc<Envelope>>,
}

/// Consumer side of a session, owned by its write loop.
#[derive(Debug)]
pub struct Mailbox {
    id: ConnectionId,
    receiver: mpsc::Receiver<Arc<Envelope>>,
}

impl Connection {
    /// Creates a connection for `user_email`, optionally pre-joined to
    /// `channel_id`, with a mailbox of `capacity` entries (at least 1).
    #[must_use]
    pub fn new(
        user_email: impl Into<String>,
        channel_id: Option<ChannelId>,
        capacity: usize,
    ) -> (Self, Mailbox) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                user_email: user_email.into(),
                channel_id,
                sender,
            },
            Mailbox { id, receiver },
        )
    }

    /// Returns the session identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    /// Returns the channel the connection is currently joined to.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    pub(crate) fn set_channel(&mut self, channel_id: Option<ChannelId>) -> Option<ChannelId> {
        std::mem::replace(&mut self.channel_id, channel_id)
    }

    /// Queues an envelope without waiting.
    pub fn deliver(&self, envelope: &Arc<Envelope>) -> Delivery {
        match self.sender.try_send(Arc::clone(envelope)) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

impl Mailbox {
    /// Returns the identity of the connection this mailbox belongs to.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Waits for the next envelope. Returns `None` once the hub has
    /// dropped the connection and the queue is empty.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.recv().await
    }

    /// Returns `true` if no envelope is currently queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Takes `first` plus everything already queued, up to `max` entries.
    #[must_use]
    pub fn drain_ready(&mut self, first: Arc<Envelope>, max: usize) -> Vec<Arc<Envelope>> {
        let mut batch = vec![first];
        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }
        batch
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_mailbox_reports_full() {
        let (conn, _mailbox) = Connection::new("a@example.com", None, 1);
        let env = Arc::new(Envelope::pong());
        assert_eq!(conn.deliver(&env), Delivery::Queued);
        assert_eq!(conn.deliver(&env), Delivery::Full);
    }

    #[tokio::test]
    async fn dropped_mailbox_reports_closed() {
        let (conn, mailbox) = Connection::new("a@example.com", None, 4);
        drop(mailbox);
        assert_eq!(conn.deliver(&Arc::new(Envelope::pong())), Delivery::Closed);
    }

    #[tokio::test]
    async fn dropping_connection_closes_mailbox() {
        let (conn, mut mailbox) = Connection::new("a@example.com", None, 4);
        assert_eq!(conn.id(), mailbox.id());
        let _ = conn.deliver(&Arc::new(Envelope::pong()));
        drop(conn);
        assert!(mailbox.recv().await.is_some());
        assert!(mailbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn drain_ready_coalesces_in_order() {
        let (conn, mut mailbox) = Connection::new("a@example.com", None, 8);
        let first = Arc::new(Envelope::pong());
        for _ in 0..3 {
            let _ = conn.deliver(&Arc::new(Envelope::pong()));
        }
        let batch = mailbox.drain_ready(Arc::clone(&first), 3);
        assert_eq!(batch.len(), 3);
        assert!(batch.first().is_some_and(|e| Arc::ptr_eq(e, &first)));
        let rest = mailbox.drain_ready(first, 16);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (conn, _mailbox) = Connection::new("a@example.com", None, 0);
        assert_eq!(conn.deliver(&Arc::new(Envelope::pong())), Delivery::Queued);
    }
}
