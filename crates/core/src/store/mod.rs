//! Durable upload queue storage.
//!
//! A store persists the whole ordered sequence of envelopes. It does no
//! locking of its own; the delivery coordinator is its single writer.

use async_trait::async_trait;

use crate::domain::envelope::Envelope;
use crate::errors::QueueStoreError;

pub mod file;
pub mod memory;

pub use file::FileQueueStore;
pub use memory::InMemoryQueueStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Reads the persisted queue. Missing, empty or unreadable storage yields an empty queue.
    async fn load(&self) -> Vec<Envelope>;

    /// Replaces the persisted queue with `envelopes`, in order.
    async fn save(&self, envelopes: &[Envelope]) -> Result<(), QueueStoreError>;

    /// Appends to the tail and returns the new queue length.
    async fn append(&self, envelope: Envelope) -> Result<usize, QueueStoreError> {
        let mut queue = self.load().await;
        queue.push(envelope);
        self.save(&queue).await?;
        Ok(queue.len())
    }

    async fn peek_first(&self) -> Option<Envelope> {
        self.load().await.into_iter().next()
    }

    /// Removes and returns the head; an empty queue is left untouched.
    async fn remove_first(&self) -> Result<Option<Envelope>, QueueStoreError> {
        let mut queue = self.load().await;
        if queue.is_empty() {
            return Ok(None);
        }

        let head = queue.remove(0);
        self.save(&queue).await?;
        Ok(Some(head))
    }
}
