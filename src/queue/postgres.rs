//! PostgreSQL-backed durable queue.
//!
//! All queues share one `queue_messages` table keyed by queue name. An
//! entry is popped with a single `DELETE … RETURNING` over a
//! `FOR UPDATE SKIP LOCKED` sub-select, so concurrent consumers never
//! receive the same row and the row is gone before processing starts.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{MessageQueue, QueueError};
use crate::config::GatewayConfig;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS queue_messages (\
        id BIGSERIAL PRIMARY KEY, \
        queue TEXT NOT NULL, \
        payload BYTEA NOT NULL, \
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now()\
    )";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS queue_messages_queue_id_idx ON queue_messages (queue, id)";

/// Opens a connection pool using the database settings in `config`.
///
/// # Errors
///
/// Returns a [`QueueError::Backend`] if the database cannot be reached.
pub async fn connect_pool(config: &GatewayConfig) -> Result<PgPool, QueueError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// One named queue stored in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    pool: PgPool,
    name: String,
    poll_interval: Duration,
}

impl PostgresQueue {
    /// Creates a handle for queue `name`, polling every `poll_interval`
    /// while the queue is empty.
    #[must_use]
    pub fn new(pool: PgPool, name: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            pool,
            name: name.into(),
            poll_interval,
        }
    }

    /// Creates the backing table and index if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Backend`] on database failure.
    pub async fn declare(&self) -> Result<(), QueueError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::debug!(queue = %self.name, "queue declared");
        Ok(())
    }

    /// Removes and returns the oldest entry, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::Backend`] on database failure.
    pub async fn try_pop(&self) -> Result<Option<Vec<u8>>, QueueError> {
        let payload = sqlx::query_scalar::<_, Vec<u8>>(
            "DELETE FROM queue_messages WHERE id = (\
                SELECT id FROM queue_messages WHERE queue = $1 \
                ORDER BY id FOR UPDATE SKIP LOCKED LIMIT 1\
             ) RETURNING payload",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }
}

#[async_trait]
impl MessageQueue for PostgresQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO queue_messages (queue, payload) VALUES ($1, $2)")
            .bind(&self.name)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, QueueError> {
        loop {
            if let Some(payload) = self.try_pop().await? {
                return Ok(payload);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
