//! Façade the message CRUD layer calls after a write has been confirmed.
//!
//! Each call turns a [`MessageEvent`] into an [`Envelope`] and hands it to
//! the hub's ordered channel-broadcast path. Nothing is broadcast
//! speculatively: callers report only changes that were persisted.

use crate::domain::{ChatMessage, DeletedMessage, Envelope, MessageEvent};
use crate::hub::Hub;

/// Translates message events into channel broadcasts.
#[derive(Debug, Clone)]
pub struct BroadcastGateway {
    hub: Hub,
}

impl BroadcastGateway {
    /// Creates a gateway that broadcasts through `hub`.
    #[must_use]
    pub const fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Broadcasts `event` to every member of its channel.
    pub async fn publish(&self, event: MessageEvent) {
        let channel_id = event.channel_id().clone();
        let envelope = Envelope::from_message_event(event);
        tracing::debug!(
            channel_id = %channel_id,
            event = envelope.type_str(),
            "broadcasting message event"
        );
        self.hub.broadcast_channel(channel_id, envelope).await;
    }

    /// Broadcasts a `new_message` event.
    pub async fn message_created(&self, message: ChatMessage) {
        self.publish(MessageEvent::Created(message)).await;
    }

    /// Broadcasts a `message_updated` event.
    pub async fn message_updated(&self, message: ChatMessage) {
        self.publish(MessageEvent::Updated(message)).await;
    }

    /// Broadcasts a `message_deleted` event.
    pub async fn message_deleted(&self, message: DeletedMessage) {
        self.publish(MessageEvent::Deleted(message)).await;
    }

    /// Delivers `event` to every connected session regardless of channel,
    /// without waiting for hub capacity.
    ///
    /// Returns `false` if the event was dropped.
    pub fn broadcast_to_all(&self, event: MessageEvent) -> bool {
        self.hub.broadcast_all(Envelope::from_message_event(event))
    }
}
