use super::store::{DelayStore, QueueError};
use crate::model::{Item, QueuedItem};
use std::fmt;
use std::sync::Arc;

/// A named queue on a shared [`DelayStore`]. Entries are scored by the item's
/// source creation time, so the earliest-created item is always next.
#[derive(Clone)]
pub struct DelayQueue {
    name: Arc<str>,
    store: Arc<dyn DelayStore>,
}

impl fmt::Debug for DelayQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayQueue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DelayQueue {
    pub fn new(name: impl Into<String>, store: Arc<dyn DelayStore>) -> Self {
        Self {
            name: Arc::from(name.into()),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `item` scored by its original creation time. Re-pushing an
    /// item that is still waiting only updates its score.
    pub async fn push_back(&self, item: &Item) -> Result<(), QueueError> {
        self.store
            .upsert(&self.name, item.id(), item.created_at())
            .await
    }

    /// Blocks until an entry is available and returns the earliest-created one.
    pub async fn pop_next(&self) -> Result<QueuedItem, QueueError> {
        let (id, score) = self.store.pop_min(&self.name).await?;
        QueuedItem::from_queue_entry(id, score).ok_or_else(|| QueueError::Decode {
            queue: self.name.to_string(),
            message: format!("score {score} of item {id} is not a valid timestamp"),
        })
    }

    pub async fn pending(&self) -> Result<usize, QueueError> {
        self.store.pending(&self.name).await
    }
}
