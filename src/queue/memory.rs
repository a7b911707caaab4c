//! In-process queue backend.
//!
//! Holds entries in a mutex-guarded `VecDeque` with a [`Notify`] to wake
//! waiting consumers. Nothing survives a restart, so this backend is meant
//! for tests and single-process development setups
//! (`QUEUE_BACKEND=memory`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{MessageQueue, QueueError};

/// Unbounded in-memory FIFO.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    entries: Mutex<VecDeque<Vec<u8>>>,
    ready: Notify,
    closed: AtomicBool,
}

impl MemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops accepting entries. Entries already queued can still be
    /// received; afterwards [`MessageQueue::receive`] reports
    /// [`QueueError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_waiters();
    }

    /// Returns the number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if no entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed(self.name.clone()));
        }
        self.entries().push_back(payload);
        self.ready.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, QueueError> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so a close or publish in between
            // is not missed.
            notified.as_mut().enable();

            let next = self.entries().pop_front();
            if let Some(payload) = next {
                return Ok(payload);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed(self.name.clone()));
            }
            notified.await;
        }
    }
}
