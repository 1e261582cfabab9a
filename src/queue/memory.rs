use super::store::{DelayStore, QueueError};
use crate::model::ItemId;
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
struct QueueSet {
    by_score: BTreeSet<(i64, ItemId)>,
    scores: HashMap<ItemId, i64>,
}

impl QueueSet {
    fn upsert(&mut self, member: ItemId, score: i64) {
        if let Some(previous) = self.scores.insert(member, score) {
            self.by_score.remove(&(previous, member));
        }
        self.by_score.insert((score, member));
    }

    fn pop_min(&mut self) -> Option<(ItemId, i64)> {
        let (score, member) = self.by_score.pop_first()?;
        self.scores.remove(&member);
        Some((member, score))
    }

    fn len(&self) -> usize {
        self.by_score.len()
    }
}

/// In-process delay store. Each queue is a set ordered by `(score, member)`;
/// waiters on an empty queue park on a [`Notify`] until something is pushed.
#[derive(Default)]
pub struct MemoryDelayStore {
    queues: Mutex<HashMap<String, QueueSet>>,
    notify: Notify,
}

impl MemoryDelayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, queue: &str, member: ItemId, score: i64) {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_owned()).or_default().upsert(member, score);
        drop(queues);
        self.notify.notify_waiters();
    }

    pub async fn pop_min(&self, queue: &str) -> (ItemId, i64) {
        loop {
            if let Some(entry) = self.try_pop_min(queue).await {
                return entry;
            }
            // Registered before the second check so a push landing in between
            // still wakes this waiter.
            let notified = self.notify.notified();
            if let Some(entry) = self.try_pop_min(queue).await {
                return entry;
            }
            notified.await;
        }
    }

    pub async fn try_pop_min(&self, queue: &str) -> Option<(ItemId, i64)> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue).and_then(QueueSet::pop_min)
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(QueueSet::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }
}

impl DelayStore for MemoryDelayStore {
    fn upsert<'a>(
        &'a self,
        queue: &'a str,
        member: ItemId,
        score: i64,
    ) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            MemoryDelayStore::upsert(self, queue, member, score).await;
            Ok(())
        })
    }

    fn pop_min<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<(ItemId, i64), QueueError>> {
        Box::pin(async move { Ok(MemoryDelayStore::pop_min(self, queue).await) })
    }

    fn pending<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<usize, QueueError>> {
        Box::pin(async move { Ok(self.len(queue).await) })
    }
}
