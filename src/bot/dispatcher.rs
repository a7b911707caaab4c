//! Background consumer that turns quote commands into quote replies.
//!
//! For every command taken off the command queue exactly one reply is
//! published to the response queue: the formatted quote on success, or a
//! failure text addressed to the same channel and requester when the
//! lookup errors or exceeds its time budget. Undecodable payloads are
//! logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::quote_provider::{QuoteError, QuoteProvider, format_failure, format_quote};
use crate::domain::{QuoteCommand, QuoteReply};
use crate::queue::{MessageQueue, QueueError};

/// Default identity quote replies are posted as.
pub const DEFAULT_RESPONDER: &str = "stock_bot";

/// Consumes [`QuoteCommand`]s and publishes [`QuoteReply`]s.
#[derive(Debug)]
pub struct CommandDispatcher {
    commands: Arc<dyn MessageQueue>,
    replies: Arc<dyn MessageQueue>,
    provider: Arc<dyn QuoteProvider>,
    responder: String,
    lookup_timeout: Duration,
    retry_delay: Duration,
}

impl CommandDispatcher {
    /// Creates a dispatcher reading `commands` and writing `replies`.
    #[must_use]
    pub fn new(
        commands: Arc<dyn MessageQueue>,
        replies: Arc<dyn MessageQueue>,
        provider: Arc<dyn QuoteProvider>,
        responder: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            commands,
            replies,
            provider,
            responder: responder.into(),
            lookup_timeout,
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

    /// Consumes the command queue until it is closed.
    pub async fn run(self) {
        tracing::info!(queue = self.commands.name(), "quote dispatcher started");
        loop {
            match self.commands.receive().await {
                Ok(payload) => {
                    let _ = self.handle_payload(&payload).await;
                }
                Err(QueueError::Closed(_)) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to receive quote command");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
        tracing::info!(queue = self.commands.name(), "quote dispatcher stopped");
    }

    /// Handles one raw queue entry, returning the published reply.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<QuoteReply> {
        let command = match QuoteCommand::decode(payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "dropping malformed quote command"
                );
                return None;
            }
        };

        let reply = self.resolve(&command).await;
        match reply.encode() {
            Ok(encoded) => {
                if let Err(e) = self.replies.publish(encoded).await {
                    tracing::error!(
                        error = %e,
                        channel_id = %reply.channel_id,
                        "failed to publish quote reply"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode quote reply"),
        }
        Some(reply)
    }

    /// Looks up the quote for `command` and builds the reply.
    pub async fn resolve(&self, command: &QuoteCommand) -> QuoteReply {
        let lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.provider.fetch_quote(&command.stock_code),
        )
        .await
        .unwrap_or(Err(QuoteError::Timeout(self.lookup_timeout)));

        let text = match lookup {
            Ok(quote) => format_quote(&command.stock_code, quote.price),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    stock_code = %command.stock_code,
                    channel_id = %command.channel_id,
                    "quote lookup failed"
                );
                format_failure(&command.stock_code)
            }
        };

        QuoteReply {
            channel_id: command.channel_id.clone(),
            user_email: command.user_email.clone(),
            responder: self.responder.clone(),
            text,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::bot::quote_provider::Quote;
    use crate::domain::ChannelId;
    use crate::queue::MemoryQueue;

    #[derive(Debug)]
    enum Behaviour {
        Price(f64),
        Fail,
        Hang,
    }

    #[derive(Debug)]
    struct FakeProvider(Behaviour);

    #[async_trait]
    impl QuoteProvider for FakeProvider {
        async fn fetch_quote(&self, stock_code: &str) -> Result<Quote, QuoteError> {
            match self.0 {
                Behaviour::Price(price) => Ok(Quote {
                    symbol: stock_code.to_string(),
                    price,
                }),
                Behaviour::Fail => Err(QuoteError::Status(503)),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(QuoteError::Status(504))
                }
            }
        }
    }

    fn dispatcher(behaviour: Behaviour) -> (CommandDispatcher, Arc<MemoryQueue>, Arc<MemoryQueue>) {
        let commands = Arc::new(MemoryQueue::new("stock_commands"));
        let replies = Arc::new(MemoryQueue::new("stock_responses"));
        let d = CommandDispatcher::new(
            Arc::clone(&commands) as Arc<dyn MessageQueue>,
            Arc::clone(&replies) as Arc<dyn MessageQueue>,
            Arc::new(FakeProvider(behaviour)),
            DEFAULT_RESPONDER,
            Duration::from_millis(50),
        );
        (d, commands, replies)
    }

    async fn published_reply(replies: &MemoryQueue) -> QuoteReply {
        let Ok(payload) = replies.receive().await else {
            panic!("expected a published reply");
        };
        let Ok(reply) = QuoteReply::decode(&payload) else {
            panic!("published reply should decode");
        };
        reply
    }

    #[tokio::test]
    async fn successful_lookup_publishes_quote() {
        let (d, _commands, replies) = dispatcher(Behaviour::Price(12.5));
        let reply = d.handle_payload(b"c1|alice|ACME").await;
        assert!(reply.is_some());

        let published = published_reply(&replies).await;
        assert_eq!(
            published,
            QuoteReply {
                channel_id: ChannelId::from("c1"),
                user_email: "alice".to_string(),
                responder: "stock_bot".to_string(),
                text: "ACME quote is $12.50".to_string(),
            }
        );
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_still_replies() {
        let (d, _commands, replies) = dispatcher(Behaviour::Fail);
        let _ = d.handle_payload(b"c1|alice|ACME").await;
        let published = published_reply(&replies).await;
        assert_eq!(published.channel_id, ChannelId::from("c1"));
        assert_eq!(published.user_email, "alice");
        assert_eq!(published.text, "Error fetching stock data for ACME");
    }

    #[tokio::test]
    async fn timed_out_lookup_replies_with_failure() {
        let (d, _commands, replies) = dispatcher(Behaviour::Hang);
        let _ = d.handle_payload(b"c7|bob|SLOW").await;
        let published = published_reply(&replies).await;
        assert_eq!(published.channel_id, ChannelId::from("c7"));
        assert_eq!(published.user_email, "bob");
        assert_eq!(published.text, "Error fetching stock data for SLOW");
    }

    #[tokio::test]
    async fn malformed_command_is_dropped() {
        let (d, _commands, replies) = dispatcher(Behaviour::Price(1.0));
        assert!(d.handle_payload(b"c1|alice").await.is_none());
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn run_drains_queue_and_stops_when_closed() {
        let (d, commands, replies) = dispatcher(Behaviour::Price(2.0));
        for code in ["A", "B", "C"] {
            let cmd = QuoteCommand {
                channel_id: ChannelId::from("c1"),
                user_email: "alice".to_string(),
                stock_code: code.to_string(),
            };
            let Ok(payload) = cmd.encode() else {
                panic!("encode failed");
            };
            tokio_test::assert_ok!(commands.publish(payload).await);
        }
        commands.close();

        let Ok(()) = d.spawn().await else {
            panic!("dispatcher task failed");
        };
        assert_eq!(replies.len(), 3);
        assert_eq!(published_reply(&replies).await.text, "A quote is $2.00");
    }
}
