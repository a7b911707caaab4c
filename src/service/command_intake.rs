//! Recognises quote commands in chat content and enqueues them.
//!
//! The message CRUD layer passes every new message through
//! [`CommandIntake::intercept`] before persisting it. Content that starts
//! with `/stock=` is turned into a [`QuoteCommand`] on the command queue
//! and must not be stored or broadcast as an ordinary chat message.

use std::sync::Arc;

use crate::domain::quote::parse_stock_command;
use crate::domain::{ChannelId, QuoteCommand};
use crate::error::GatewayError;
use crate::queue::MessageQueue;

/// Entry point of the quote pipeline on the chat side.
#[derive(Debug, Clone)]
pub struct CommandIntake {
    commands: Arc<dyn MessageQueue>,
}

impl CommandIntake {
    /// Creates an intake that publishes to `commands`.
    #[must_use]
    pub fn new(commands: Arc<dyn MessageQueue>) -> Self {
        Self { commands }
    }

    /// Publishes a [`QuoteCommand`] if `content` is a `/stock=` command.
    ///
    /// Returns `Ok(None)` for ordinary chat content, which the caller
    /// should persist and broadcast as usual.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when the stock code is
    /// empty, [`GatewayError::QueueError`] if the command cannot be
    /// published, or [`GatewayError::Internal`] if it cannot be encoded.
    pub async fn intercept(
        &self,
        channel_id: &ChannelId,
        user_email: &str,
        content: &str,
    ) -> Result<Option<QuoteCommand>, GatewayError> {
        let Some(stock_code) = parse_stock_command(content) else {
            return Ok(None);
        };
        if stock_code.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "stock code is empty".to_string(),
            ));
        }

        let command = QuoteCommand {
            channel_id: channel_id.clone(),
            user_email: user_email.to_string(),
            stock_code: stock_code.to_string(),
        };
        let payload = command
            .encode()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.commands.publish(payload).await?;
        tracing::info!(
            channel_id = %channel_id,
            user_email,
            stock_code,
            "queued stock command"
        );
        Ok(Some(command))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;

    fn intake() -> (CommandIntake, Arc<MemoryQueue>) {
        let queue = Arc::new(MemoryQueue::new("stock_commands"));
        (
            CommandIntake::new(Arc::clone(&queue) as Arc<dyn MessageQueue>),
            queue,
        )
    }

    #[tokio::test]
    async fn plain_content_passes_through() {
        let (intake, queue) = intake();
        let result = intake
            .intercept(&ChannelId::from("c1"), "alice", "hello there")
            .await;
        assert!(matches!(result, Ok(None)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn stock_command_is_enqueued() {
        let (intake, queue) = intake();
        let Ok(Some(command)) = intake
            .intercept(&ChannelId::from("c1"), "alice", "/stock=aapl.us ")
            .await
        else {
            panic!("expected a queued command");
        };
        assert_eq!(command.stock_code, "aapl.us");

        let Ok(payload) = queue.receive().await else {
            panic!("expected a payload");
        };
        let Ok(decoded) = QuoteCommand::decode(&payload) else {
            panic!("payload should decode");
        };
        assert_eq!(decoded, command);
    }

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let (intake, queue) = intake();
        let result = intake
            .intercept(&ChannelId::from("c1"), "alice", "/stock=  ")
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn closed_queue_surfaces_error() {
        let (intake, queue) = intake();
        queue.close();
        let result = intake
            .intercept(&ChannelId::from("c1"), "alice", "/stock=ACME")
            .await;
        assert!(matches!(result, Err(GatewayError::QueueError(_))));
    }
}
