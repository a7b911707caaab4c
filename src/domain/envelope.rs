//! Server → client event envelopes.
//!
//! An [`Envelope`] is built once, wrapped in an `Arc` and shared by every
//! mailbox it is queued on; nothing mutates it afterwards. The payload is a
//! closed enum ([`EnvelopeEvent`]) so each `type` discriminant has exactly
//! one statically known `data` shape.
//!
//! Wire format:
//!
//! ```json
//! {
//!   "type": "new_message",
//!   "channel_id": "c1",
//!   "user_email": "alice@example.com",
//!   "content": "hello",
//!   "timestamp": "2024-01-02T03:04:05Z",
//!   "data": { "id": "m1", "channel_id": "c1", "user_email": "alice@example.com",
//!             "content": "hello", "created_at": "2024-01-02T03:04:05Z" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{ChannelId, ChatMessage, ConnectionId, DeletedMessage, MessageEvent, timestamp};

/// Event carried by an [`Envelope`], one variant per wire discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeEvent {
    /// Greeting enqueued right after registration.
    Connected {
        /// Identity assigned to the new session.
        connection_id: ConnectionId,
    },
    /// Acknowledges a `join_channel` request.
    ChannelJoined,
    /// Acknowledges a `leave_channel` request.
    ChannelLeft,
    /// Reply to an application-level `ping`.
    Pong,
    /// A message was created in the channel.
    NewMessage(ChatMessage),
    /// A message in the channel was edited.
    MessageUpdated(ChatMessage),
    /// A message in the channel was deleted.
    MessageDeleted(DeletedMessage),
}

impl EnvelopeEvent {
    /// Returns the wire discriminant.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ChannelJoined => "channel_joined",
            Self::ChannelLeft => "channel_left",
            Self::Pong => "pong",
            Self::NewMessage(_) => "new_message",
            Self::MessageUpdated(_) => "message_updated",
            Self::MessageDeleted(_) => "message_deleted",
        }
    }
}

/// One typed event unit delivered over a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    event: EnvelopeEvent,
    channel_id: Option<ChannelId>,
    user_email: Option<String>,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    fn build(
        event: EnvelopeEvent,
        channel_id: Option<ChannelId>,
        user_email: Option<String>,
    ) -> Self {
        Self {
            event,
            channel_id,
            user_email,
            timestamp: Utc::now(),
        }
    }

    /// `connected` greeting for a freshly registered session.
    #[must_use]
    pub fn connected(
        connection_id: ConnectionId,
        user_email: &str,
        channel_id: Option<ChannelId>,
    ) -> Self {
        Self::build(
            EnvelopeEvent::Connected { connection_id },
            channel_id,
            Some(user_email.to_string()),
        )
    }

    /// `channel_joined` acknowledgement.
    #[must_use]
    pub fn channel_joined(channel_id: ChannelId, user_email: &str) -> Self {
        Self::build(
            EnvelopeEvent::ChannelJoined,
            Some(channel_id),
            Some(user_email.to_string()),
        )
    }

    /// `channel_left` acknowledgement.
    #[must_use]
    pub fn channel_left(channel_id: ChannelId, user_email: &str) -> Self {
        Self::build(
            EnvelopeEvent::ChannelLeft,
            Some(channel_id),
            Some(user_email.to_string()),
        )
    }

    /// `pong` reply.
    #[must_use]
    pub fn pong() -> Self {
        Self::build(EnvelopeEvent::Pong, None, None)
    }

    /// Wraps a confirmed message change.
    #[must_use]
    pub fn from_message_event(event: MessageEvent) -> Self {
        match event {
            MessageEvent::Created(msg) => {
                let (channel, author) = (msg.channel_id.clone(), msg.user_email.clone());
                Self::build(EnvelopeEvent::NewMessage(msg), Some(channel), Some(author))
            }
            MessageEvent::Updated(msg) => {
                let (channel, author) = (msg.channel_id.clone(), msg.user_email.clone());
                Self::build(
                    EnvelopeEvent::MessageUpdated(msg),
                    Some(channel),
                    Some(author),
                )
            }
            MessageEvent::Deleted(del) => {
                let (channel, author) = (del.channel_id.clone(), del.user_email.clone());
                Self::build(
                    EnvelopeEvent::MessageDeleted(del),
                    Some(channel),
                    Some(author),
                )
            }
        }
    }

    /// Returns the event payload.
    #[must_use]
    pub const fn event(&self) -> &EnvelopeEvent {
        &self.event
    }

    /// Returns the wire discriminant.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        self.event.type_str()
    }

    /// Returns the target channel, if any.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    /// Returns the principal, if any.
    #[must_use]
    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    /// Returns the top-level text body. Only message events carry one.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match &self.event {
            EnvelopeEvent::NewMessage(m) | EnvelopeEvent::MessageUpdated(m) => Some(&m.content),
            _ => None,
        }
    }

    /// Returns the construction timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serializes the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireData<'a> {
    Connected { connection_id: ConnectionId },
    Message(&'a ChatMessage),
    Deleted(&'a DeletedMessage),
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a ChannelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<WireData<'a>>,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = match &self.event {
            EnvelopeEvent::Connected { connection_id } => Some(WireData::Connected {
                connection_id: *connection_id,
            }),
            EnvelopeEvent::NewMessage(m) | EnvelopeEvent::MessageUpdated(m) => {
                Some(WireData::Message(m))
            }
            EnvelopeEvent::MessageDeleted(d) => Some(WireData::Deleted(d)),
            EnvelopeEvent::ChannelJoined | EnvelopeEvent::ChannelLeft | EnvelopeEvent::Pong => {
                None
            }
        };
        WireEnvelope {
            kind: self.type_str(),
            channel_id: self.channel_id.as_ref(),
            user_email: self.user_email.as_deref(),
            content: self.content(),
            timestamp: timestamp::format(&self.timestamp),
            data,
        }
        .serialize(serializer)
    }
}
