//! Process-wide connection registry.
//!
//! [`Hub`] is a cloneable handle to a single actor task. Every operation
//! that touches the connection table or the channel membership index is a
//! command processed in order by that actor, so concurrent
//! register/unregister/join/leave calls never race and broadcasts to one
//! channel reach every mailbox in issue order.
//!
//! [`Hub::stats`] is the one exception: it reads the membership index
//! through a [`tokio::sync::RwLock`] and never enters the command queue.
//!
//! A connection whose mailbox is full when the actor delivers to it is
//! evicted: the hub drops its sender (closing the mailbox), removes it
//! from the index and moves on. The session's write loop observes the
//! closed mailbox and shuts the transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};

use super::connection::{Connection, Delivery};
use super::stats::{HubCounters, HubStats, MembershipIndex};
use crate::domain::{ChannelId, ConnectionId, Envelope};

/// Default capacity of the hub's command queue.
pub const DEFAULT_HUB_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
    Join {
        connection_id: ConnectionId,
        channel_id: ChannelId,
    },
    Leave(ConnectionId),
    SendTo {
        connection_id: ConnectionId,
        envelope: Arc<Envelope>,
    },
    BroadcastChannel {
        channel_id: ChannelId,
        envelope: Arc<Envelope>,
    },
    BroadcastAll(Arc<Envelope>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the connection registry actor.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
    index: Arc<RwLock<MembershipIndex>>,
    counters: Arc<HubCounters>,
}

impl Hub {
    /// Spawns the registry actor on the current Tokio runtime.
    ///
    /// The actor stops once every `Hub` clone has been dropped.
    #[must_use]
    pub fn spawn(queue_capacity: usize) -> Self {
        let (hub, actor) = Self::detached(queue_capacity);
        tokio::spawn(actor.run());
        hub
    }

    fn detached(queue_capacity: usize) -> (Self, HubActor) {
        let (commands, receiver) = mpsc::channel(queue_capacity.max(1));
        let index = Arc::new(RwLock::new(MembershipIndex::default()));
        let counters = Arc::new(HubCounters::default());
        let actor = HubActor {
            receiver,
            connections: HashMap::new(),
            index: Arc::clone(&index),
            counters: Arc::clone(&counters),
        };
        (
            Self {
                commands,
                index,
                counters,
            },
            actor,
        )
    }

    async fn submit(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            tracing::warn!("hub actor has stopped; command discarded");
        }
    }

    /// Adds a connection (and its declared channel membership, if any) and
    /// queues its `connected` greeting.
    pub async fn register(&self, connection: Connection) {
        self.submit(HubCommand::Register(connection)).await;
    }

    /// Removes a connection and its membership. Repeated calls are no-ops.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        self.submit(HubCommand::Unregister(connection_id)).await;
    }

    /// Moves a connection into `channel_id`, leaving its previous channel,
    /// and acknowledges with `channel_joined`.
    pub async fn join(&self, connection_id: ConnectionId, channel_id: ChannelId) {
        self.submit(HubCommand::Join {
            connection_id,
            channel_id,
        })
        .await;
    }

    /// Removes a connection from its current channel and acknowledges with
    /// `channel_left`. Does nothing if it is not in a channel.
    pub async fn leave(&self, connection_id: ConnectionId) {
        self.submit(HubCommand::Leave(connection_id)).await;
    }

    /// Delivers an envelope to a single connection.
    pub async fn send_to(&self, connection_id: ConnectionId, envelope: Envelope) {
        self.submit(HubCommand::SendTo {
            connection_id,
            envelope: Arc::new(envelope),
        })
        .await;
    }

    /// Delivers an envelope to every connection joined to `channel_id`.
    pub async fn broadcast_channel(&self, channel_id: ChannelId, envelope: Envelope) {
        self.submit(HubCommand::BroadcastChannel {
            channel_id,
            envelope: Arc::new(envelope),
        })
        .await;
    }

    /// Delivers an envelope to every registered connection without waiting.
    ///
    /// Returns `false` if the hub queue was saturated and the event was
    /// dropped; drops are counted in [`HubStats::dropped_broadcasts`].
    pub fn broadcast_all(&self, envelope: Envelope) -> bool {
        match self
            .commands
            .try_send(HubCommand::BroadcastAll(Arc::new(envelope)))
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters
                    .dropped_broadcasts
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!("hub queue is full, dropping broadcast");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("hub actor has stopped; broadcast discarded");
                false
            }
        }
    }

    /// Returns connection and per-channel membership counts.
    pub async fn stats(&self) -> HubStats {
        self.index.read().await.snapshot(&self.counters)
    }

    /// Waits until every command submitted before this call has been
    /// processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(HubCommand::Flush(tx)).await;
        let _ = rx.await;
    }
}

/// The single ordered mutation path behind [`Hub`].
#[derive(Debug)]
struct HubActor {
    receiver: mpsc::Receiver<HubCommand>,
    connections: HashMap<ConnectionId, Connection>,
    index: Arc<RwLock<MembershipIndex>>,
    counters: Arc<HubCounters>,
}

impl HubActor {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        tracing::debug!("hub actor stopped");
    }

    async fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(connection) => self.register(connection).await,
            HubCommand::Unregister(id) => {
                if self.remove(id).await {
                    tracing::info!(
                        connection_id = %id,
                        total = self.connections.len(),
                        "client disconnected"
                    );
                }
            }
            HubCommand::Join {
                connection_id,
                channel_id,
            } => self.join(connection_id, channel_id).await,
            HubCommand::Leave(id) => self.leave(id).await,
            HubCommand::SendTo {
                connection_id,
                envelope,
            } => self.deliver(&[connection_id], &envelope).await,
            HubCommand::BroadcastChannel {
                channel_id,
                envelope,
            } => {
                let members = self.index.read().await.members(&channel_id);
                self.deliver(&members, &envelope).await;
            }
            HubCommand::BroadcastAll(envelope) => {
                let all: Vec<ConnectionId> = self.connections.keys().copied().collect();
                self.deliver(&all, &envelope).await;
            }
            HubCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn register(&mut self, connection: Connection) {
        let id = connection.id();
        // Re-registering an id replaces the previous entry.
        self.remove(id).await;

        let greeting = Arc::new(Envelope::connected(
            id,
            connection.user_email(),
            connection.channel_id().cloned(),
        ));
        {
            let mut index = self.index.write().await;
            if let Some(channel_id) = connection.channel_id() {
                index.insert(channel_id.clone(), id);
            }
            self.connections.insert(id, connection);
            index.set_total(self.connections.len());
        }
        tracing::info!(
            connection_id = %id,
            total = self.connections.len(),
            "client connected"
        );
        self.deliver(&[id], &greeting).await;
    }

    async fn join(&mut self, id: ConnectionId, channel_id: ChannelId) {
        if channel_id.as_str().is_empty() {
            return;
        }
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        let previous = connection.set_channel(Some(channel_id.clone()));
        let ack = Arc::new(Envelope::channel_joined(
            channel_id.clone(),
            connection.user_email(),
        ));
        {
            let mut index = self.index.write().await;
            if let Some(previous) = &previous {
                index.remove(previous, id);
            }
            index.insert(channel_id.clone(), id);
        }
        tracing::info!(
            connection_id = %id,
            channel_id = %channel_id,
            previous = ?previous.as_ref().map(ChannelId::as_str),
            "joined channel"
        );
        self.deliver(&[id], &ack).await;
    }

    async fn leave(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        let Some(previous) = connection.set_channel(None) else {
            return;
        };
        let ack = Arc::new(Envelope::channel_left(
            previous.clone(),
            connection.user_email(),
        ));
        self.index.write().await.remove(&previous, id);
        tracing::info!(connection_id = %id, channel_id = %previous, "left channel");
        self.deliver(&[id], &ack).await;
    }

    /// Queues `envelope` on each target's mailbox, evicting targets whose
    /// mailbox is full or closed.
    async fn deliver(&mut self, targets: &[ConnectionId], envelope: &Arc<Envelope>) {
        let mut failed = Vec::new();
        for id in targets {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };
            match connection.deliver(envelope) {
                Delivery::Queued => {}
                outcome => failed.push((*id, outcome)),
            }
        }
        for (id, outcome) in failed {
            if !self.remove(id).await {
                continue;
            }
            if outcome == Delivery::Full {
                self.counters
                    .evicted_connections
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    connection_id = %id,
                    envelope = envelope.type_str(),
                    "mailbox full, evicting slow connection"
                );
            } else {
                tracing::debug!(connection_id = %id, "mailbox closed, dropping connection");
            }
        }
    }

    /// Drops a connection and its membership. Returns `false` if it was not
    /// registered.
    async fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(&id) else {
            return false;
        };
        let mut index = self.index.write().await;
        if let Some(channel_id) = connection.channel_id() {
            index.remove(channel_id, id);
        }
        index.set_total(self.connections.len());
        true
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::EnvelopeEvent;
    use crate::hub::Mailbox;

    async fn connect(
        hub: &Hub,
        channel: Option<&str>,
        capacity: usize,
    ) -> (ConnectionId, Mailbox) {
        let (conn, mut mailbox) =
            Connection::new("user@example.com", channel.map(ChannelId::from), capacity);
        let id = conn.id();
        hub.register(conn).await;
        hub.flush().await;
        let Some(greeting) = mailbox.recv().await else {
            panic!("expected connected greeting");
        };
        assert_eq!(greeting.type_str(), "connected");
        (id, mailbox)
    }

    async fn next(mailbox: &mut Mailbox) -> Arc<Envelope> {
        let Ok(Some(env)) = tokio::time::timeout(Duration::from_secs(1), mailbox.recv()).await
        else {
            panic!("expected an envelope");
        };
        env
    }

    fn nothing_queued(mailbox: &mut Mailbox) -> bool {
        mailbox.is_empty()
    }

    #[tokio::test]
    async fn register_greets_with_identity_and_channel() {
        let hub = Hub::spawn(16);
        let (conn, mut mailbox) =
            Connection::new("a@example.com", Some(ChannelId::from("c1")), 8);
        let id = conn.id();
        hub.register(conn).await;
        let env = next(&mut mailbox).await;
        assert_eq!(env.event(), &EnvelopeEvent::Connected { connection_id: id });
        assert_eq!(env.channel_id(), Some(&ChannelId::from("c1")));
        assert_eq!(env.user_email(), Some("a@example.com"));

        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.channel_count(&ChannelId::from("c1")), 1);
    }

    #[tokio::test]
    async fn channel_broadcast_reaches_only_members() {
        let hub = Hub::spawn(64);
        let mut members = Vec::new();
        for _ in 0..3 {
            members.push(connect(&hub, Some("c1"), 8).await);
        }
        let mut others = Vec::new();
        others.push(connect(&hub, Some("c2"), 8).await);
        others.push(connect(&hub, None, 8).await);

        hub.broadcast_channel(ChannelId::from("c1"), Envelope::pong()).await;
        hub.flush().await;

        for (_, mailbox) in &mut members {
            assert_eq!(next(mailbox).await.type_str(), "pong");
        }
        for (_, mailbox) in &mut others {
            assert!(nothing_queued(mailbox));
        }
    }

    #[tokio::test]
    async fn join_moves_membership_and_prunes_empty_channel() {
        let hub = Hub::spawn(16);
        let (id, mut mailbox) = connect(&hub, None, 8).await;

        hub.join(id, ChannelId::from("a")).await;
        let ack = next(&mut mailbox).await;
        assert_eq!(ack.type_str(), "channel_joined");
        assert_eq!(ack.channel_id(), Some(&ChannelId::from("a")));

        hub.join(id, ChannelId::from("b")).await;
        assert_eq!(next(&mut mailbox).await.type_str(), "channel_joined");

        let stats = hub.stats().await;
        assert!(!stats.channels.contains_key(&ChannelId::from("a")));
        assert_eq!(stats.channel_count(&ChannelId::from("b")), 1);
    }

    #[tokio::test]
    async fn leave_acknowledges_and_clears_channel() {
        let hub = Hub::spawn(16);
        let (id, mut mailbox) = connect(&hub, Some("c1"), 8).await;

        hub.leave(id).await;
        let ack = next(&mut mailbox).await;
        assert_eq!(ack.type_str(), "channel_left");
        assert_eq!(ack.channel_id(), Some(&ChannelId::from("c1")));
        assert!(hub.stats().await.channels.is_empty());

        // Leaving again is silent.
        hub.leave(id).await;
        hub.flush().await;
        assert!(nothing_queued(&mut mailbox));
    }

    #[tokio::test]
    async fn join_with_empty_channel_is_ignored() {
        let hub = Hub::spawn(16);
        let (id, mut mailbox) = connect(&hub, Some("c1"), 8).await;

        hub.join(id, ChannelId::from("")).await;
        hub.flush().await;
        assert!(nothing_queued(&mut mailbox));
        assert_eq!(hub.stats().await.channel_count(&ChannelId::from("c1")), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = Hub::spawn(16);
        let (id, mut mailbox) = connect(&hub, Some("c1"), 8).await;
        let (_other, _other_mailbox) = connect(&hub, Some("c1"), 8).await;

        hub.unregister(id).await;
        hub.unregister(id).await;
        hub.flush().await;

        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.channel_count(&ChannelId::from("c1")), 1);
        assert!(mailbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn saturated_mailbox_is_evicted_without_blocking_others() {
        let hub = Hub::spawn(16);
        let (slow, mut slow_mailbox) = connect(&hub, Some("c1"), 1).await;
        let (_fast, mut fast_mailbox) = connect(&hub, Some("c1"), 8).await;

        hub.broadcast_channel(ChannelId::from("c1"), Envelope::pong()).await;
        hub.broadcast_channel(ChannelId::from("c1"), Envelope::pong()).await;
        hub.flush().await;

        assert_eq!(next(&mut fast_mailbox).await.type_str(), "pong");
        assert_eq!(next(&mut fast_mailbox).await.type_str(), "pong");

        let stats = hub.stats().await;
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.channel_count(&ChannelId::from("c1")), 1);
        assert_eq!(stats.evicted_connections, 1);

        // The slow mailbox keeps what it already held, then reports closed.
        assert!(slow_mailbox.recv().await.is_some());
        assert!(slow_mailbox.recv().await.is_none());

        hub.unregister(slow).await;
        hub.flush().await;
        assert_eq!(hub.stats().await.total_connections, 1);
    }

    #[tokio::test]
    async fn broadcast_all_reaches_everyone() {
        let hub = Hub::spawn(16);
        let (_a, mut a) = connect(&hub, Some("c1"), 8).await;
        let (_b, mut b) = connect(&hub, None, 8).await;

        assert!(hub.broadcast_all(Envelope::pong()));
        hub.flush().await;
        assert_eq!(next(&mut a).await.type_str(), "pong");
        assert_eq!(next(&mut b).await.type_str(), "pong");
    }

    #[tokio::test]
    async fn broadcast_all_drops_when_queue_is_saturated() {
        let (hub, _actor) = Hub::detached(1);
        assert!(hub.broadcast_all(Envelope::pong()));
        assert!(!hub.broadcast_all(Envelope::pong()));
        assert_eq!(hub.stats().await.dropped_broadcasts, 1);
    }

    #[tokio::test]
    async fn channel_order_is_preserved() {
        let hub = Hub::spawn(64);
        let (id, mut mailbox) = connect(&hub, Some("c1"), 32).await;
        hub.send_to(id, Envelope::pong()).await;
        let left = Envelope::channel_left(ChannelId::from("x"), "u");
        let joined = Envelope::channel_joined(ChannelId::from("y"), "u");
        hub.broadcast_channel(ChannelId::from("c1"), left).await;
        hub.broadcast_channel(ChannelId::from("c1"), joined).await;

        assert_eq!(next(&mut mailbox).await.type_str(), "pong");
        assert_eq!(next(&mut mailbox).await.type_str(), "channel_left");
        assert_eq!(next(&mut mailbox).await.type_str(), "channel_joined");
    }
}
