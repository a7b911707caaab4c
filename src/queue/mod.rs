//! Durable queues connecting the chat layer, the quote dispatcher and the
//! response relay.
//!
//! Consumption is acknowledge-before-process: [`MessageQueue::receive`]
//! removes the entry before returning it, so a consumer that crashes
//! mid-processing loses that entry (at-most-once delivery).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{GatewayConfig, QueueBackend};

pub use memory::MemoryQueue;
pub use postgres::PostgresQueue;

/// Default name of the queue carrying quote commands.
pub const COMMAND_QUEUE: &str = "stock_commands";

/// Default name of the queue carrying quote replies.
pub const RESPONSE_QUEUE: &str = "stock_responses";

/// Queue backend failures.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue has been closed and holds no more entries.
    #[error("queue {0} is closed")]
    Closed(String),

    /// The storage backend failed.
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// A named FIFO of opaque payloads.
#[async_trait]
pub trait MessageQueue: Send + Sync + std::fmt::Debug {
    /// Returns the queue name.
    fn name(&self) -> &str;

    /// Appends a payload.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the backend rejects the write.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Waits for the next payload and removes it from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and drained,
    /// or [`QueueError::Backend`] on a storage failure.
    async fn receive(&self) -> Result<Vec<u8>, QueueError>;
}

/// The command and response queues used by the quote pipeline.
#[derive(Debug, Clone)]
pub struct PipelineQueues {
    /// Queue carrying [`crate::domain::QuoteCommand`]s.
    pub commands: Arc<dyn MessageQueue>,
    /// Queue carrying [`crate::domain::QuoteReply`]s.
    pub replies: Arc<dyn MessageQueue>,
}

/// Opens the configured backend and declares both pipeline queues.
///
/// # Errors
///
/// Returns a [`QueueError::Backend`] if PostgreSQL cannot be reached or the
/// queue table cannot be created.
pub async fn build_queues(config: &GatewayConfig) -> Result<PipelineQueues, QueueError> {
    match config.queue_backend {
        QueueBackend::Memory => Ok(PipelineQueues {
            commands: Arc::new(MemoryQueue::new(config.command_queue.as_str())),
            replies: Arc::new(MemoryQueue::new(config.response_queue.as_str())),
        }),
        QueueBackend::Postgres => {
            let pool = postgres::connect_pool(config).await?;
            let poll = config.queue_poll_interval();
            let commands = PostgresQueue::new(pool.clone(), config.command_queue.as_str(), poll);
            let replies = PostgresQueue::new(pool, config.response_queue.as_str(), poll);
            commands.declare().await?;
            replies.declare().await?;
            tracing::info!(
                commands = %config.command_queue,
                replies = %config.response_queue,
                "postgres queues declared"
            );
            Ok(PipelineQueues {
                commands: Arc::new(commands),
                replies: Arc::new(replies),
            })
        }
    }
}
