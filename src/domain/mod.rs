//! Domain layer: identifiers, chat events, wire envelopes and the quote
//! bot's queue records.
//!
//! These types are shared by the hub, the WebSocket sessions, the
//! broadcast gateway and the bot pipeline.

pub mod channel_id;
pub mod chat_message;
pub mod connection_id;
pub mod envelope;
pub mod quote;
pub mod timestamp;

pub use channel_id::ChannelId;
pub use chat_message::{ChatMessage, DeletedMessage, MessageEvent};
pub use connection_id::ConnectionId;
pub use envelope::{Envelope, EnvelopeEvent};
pub use quote::{PayloadError, QuoteCommand, QuoteReply};
