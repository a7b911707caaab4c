//! Chat message domain events handed over by the message CRUD layer.
//!
//! The CRUD layer persists a message first and only then reports the
//! change here; these types carry exactly what the fan-out path needs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ChannelId, timestamp};

/// A persisted chat message as broadcast to channel members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Message id assigned by the store (or `bot_…` for synthetic replies).
    pub id: String,
    /// Channel the message belongs to.
    pub channel_id: ChannelId,
    /// Author principal.
    pub user_email: String,
    /// Message body.
    pub content: String,
    /// Creation timestamp.
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: DateTime<Utc>,
}

/// Identity of a message that has been deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedMessage {
    /// Id of the deleted message.
    pub id: String,
    /// Channel the message belonged to.
    pub channel_id: ChannelId,
    /// Author principal.
    pub user_email: String,
}

impl From<&ChatMessage> for DeletedMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            id: msg.id.clone(),
            channel_id: msg.channel_id.clone(),
            user_email: msg.user_email.clone(),
        }
    }
}

/// A confirmed state change on a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// A message was stored.
    Created(ChatMessage),
    /// A message's content was changed.
    Updated(ChatMessage),
    /// A message was removed.
    Deleted(DeletedMessage),
}

impl MessageEvent {
    /// Returns the channel the event is scoped to.
    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Created(m) | Self::Updated(m) => &m.channel_id,
            Self::Deleted(d) => &d.channel_id,
        }
    }
}
