//! Stock-quote bot pipeline records and their queue payload codec.
//!
//! Payloads are published as JSON records. Decoders additionally accept
//! the legacy `|`-joined positional form (`channel|user|code` and
//! `channel|user|responder|text`), which has no escaping: a field that
//! contains `|` changes the field count and the payload is rejected.

use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Chat content prefix that turns a message into a quote command.
pub const STOCK_COMMAND_PREFIX: &str = "/stock=";

const LEGACY_DELIMITER: char = '|';

/// Queue payload decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Legacy payload did not split into the expected number of fields.
    #[error("expected {expected} '|'-delimited fields, found {found}")]
    FieldCount {
        /// Number of fields the record needs.
        expected: usize,
        /// Number of fields present.
        found: usize,
    },

    /// A required field was empty.
    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    /// Payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON record could not be decoded.
    #[error("invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extracts the lookup key from chat content of the form `/stock=CODE`.
///
/// Returns `None` when the content is not a command, and `Some("")` when
/// it is a command with a missing code.
#[must_use]
pub fn parse_stock_command(content: &str) -> Option<&str> {
    content
        .trim_start()
        .strip_prefix(STOCK_COMMAND_PREFIX)
        .map(str::trim)
}

/// A quote lookup requested from a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteCommand {
    /// Channel the reply is broadcast to.
    pub channel_id: ChannelId,
    /// Principal that issued the command.
    pub user_email: String,
    /// Ticker to look up (e.g. `aapl.us`).
    pub stock_code: String,
}

/// The bot's answer to one [`QuoteCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteReply {
    /// Channel the reply is broadcast to.
    pub channel_id: ChannelId,
    /// Principal that issued the original command.
    pub user_email: String,
    /// Identity the reply is posted as.
    pub responder: String,
    /// Reply text.
    pub text: String,
}

impl QuoteCommand {
    /// Encodes the command as a JSON queue payload.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a queue payload in JSON or legacy positional form.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for malformed payloads.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload)?;
        if is_json_record(text) {
            let cmd: Self = serde_json::from_str(text)?;
            non_empty("channel_id", cmd.channel_id.as_str())?;
            non_empty("stock_code", &cmd.stock_code)?;
            return Ok(cmd);
        }
        match split_legacy(text).as_slice() {
            [channel, user, code] => Ok(Self {
                channel_id: ChannelId::new(non_empty("channel_id", channel)?),
                user_email: (*user).to_string(),
                stock_code: non_empty("stock_code", code)?.to_string(),
            }),
            fields => Err(PayloadError::FieldCount {
                expected: 3,
                found: fields.len(),
            }),
        }
    }
}

impl QuoteReply {
    /// Encodes the reply as a JSON queue payload.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a queue payload in JSON or legacy positional form.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for malformed payloads.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload)?;
        if is_json_record(text) {
            let reply: Self = serde_json::from_str(text)?;
            non_empty("channel_id", reply.channel_id.as_str())?;
            return Ok(reply);
        }
        match split_legacy(text).as_slice() {
            [channel, user, responder, body] => Ok(Self {
                channel_id: ChannelId::new(non_empty("channel_id", channel)?),
                user_email: (*user).to_string(),
                responder: (*responder).to_string(),
                text: (*body).to_string(),
            }),
            fields => Err(PayloadError::FieldCount {
                expected: 4,
                found: fields.len(),
            }),
        }
    }
}

fn is_json_record(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

fn split_legacy(text: &str) -> Vec<&str> {
    text.split(LEGACY_DELIMITER).collect()
}

fn non_empty<'a>(name: &'static str, value: &'a str) -> Result<&'a str, PayloadError> {
    if value.trim().is_empty() {
        Err(PayloadError::EmptyField(name))
    } else {
        Ok(value)
    }
}
