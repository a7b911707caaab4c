//! Background consumer that posts quote replies back into their channel.
//!
//! Each [`QuoteReply`] becomes a synthetic chat message authored by the
//! responder and is pushed through the [`BroadcastGateway`] as a
//! `new_message` event. Replies that do not decode are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::domain::{ChatMessage, QuoteReply};
use crate::queue::{MessageQueue, QueueError};
use crate::service::BroadcastGateway;

/// Consumes [`QuoteReply`]s and broadcasts them as chat messages.
#[derive(Debug)]
pub struct ResponseRelay {
    replies: Arc<dyn MessageQueue>,
    gateway: BroadcastGateway,
    retry_delay: Duration,
}

impl ResponseRelay {
    /// Creates a relay reading `replies` and broadcasting via `gateway`.
    #[must_use]
    pub fn new(replies: Arc<dyn MessageQueue>, gateway: BroadcastGateway) -> Self {
        Self {
            replies,
            gateway,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Sets how long to wait before retrying after a queue backend error.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Runs [`Self::run`] on a new Tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consumes the response queue until it is closed.
    pub async fn run(self) {
        tracing::info!(queue = self.replies.name(), "response relay started");
        loop {
            match self.replies.receive().await {
                Ok(payload) => {
                    let _ = self.handle_payload(&payload).await;
                }
                Err(QueueError::Closed(_)) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to receive quote reply");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
        tracing::info!(queue = self.replies.name(), "response relay stopped");
    }

    /// Handles one raw queue entry, returning the broadcast message.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<ChatMessage> {
        let reply = match QuoteReply::decode(payload) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "dropping malformed quote reply"
                );
                return None;
            }
        };

        let message = ChatMessage {
            id: format!("bot_{}", uuid::Uuid::new_v4().simple()),
            channel_id: reply.channel_id,
            user_email: reply.responder,
            content: reply.text,
            created_at: Utc::now(),
        };
        self.gateway.message_created(message.clone()).await;
        tracing::info!(
            channel_id = %message.channel_id,
            message_id = %message.id,
            "broadcast quote reply"
        );
        Some(message)
    }
}
