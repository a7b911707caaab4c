//! Client → server control frames.
//!
//! Inbound frames are small JSON objects with a `type` discriminant:
//!
//! ```json
//! {"type": "join_channel", "channel_id": "c1"}
//! {"type": "leave_channel"}
//! {"type": "ping"}
//! ```
//!
//! Unknown types and malformed frames are reported as [`FrameError`]s; the
//! session logs them and keeps reading.

use serde::Deserialize;

use crate::domain::ChannelId;

/// Raw inbound frame before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Control discriminant.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Target channel for `join_channel`.
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// A validated control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Switch membership to the given channel.
    JoinChannel(ChannelId),
    /// Drop the current channel membership.
    LeaveChannel,
    /// Application-level keepalive; answered with `pong`.
    Ping,
}

/// Why an inbound frame was ignored.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not a JSON object with a string `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `type` is not a supported control.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// `join_channel` without a non-empty `channel_id`.
    #[error("join_channel requires a channel_id")]
    MissingChannel,
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns a [`FrameError`] for malformed JSON, an unknown `type`, or a
/// `join_channel` without a channel.
pub fn decode_control(text: &str) -> Result<ControlMessage, FrameError> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    match frame.msg_type.as_str() {
        "join_channel" => ChannelId::parse_optional(frame.channel_id.as_deref())
            .map(ControlMessage::JoinChannel)
            .ok_or(FrameError::MissingChannel),
        "leave_channel" => Ok(ControlMessage::LeaveChannel),
        "ping" => Ok(ControlMessage::Ping),
        _ => Err(FrameError::UnknownType(frame.msg_type)),
    }
}
