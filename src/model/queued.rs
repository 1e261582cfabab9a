use super::item::ItemId;
use chrono::{DateTime, Utc};

/// Which producer strategy emitted a [`QueuedItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    LiveTail,
    DelayQueue,
}

/// An item that has been produced but not fetched yet. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    id: ItemId,
    created_at: DateTime<Utc>,
    origin: ItemOrigin,
}

impl QueuedItem {
    pub fn new(id: ItemId, created_at: DateTime<Utc>, origin: ItemOrigin) -> Self {
        Self {
            id,
            created_at,
            origin,
        }
    }

    /// An id just discovered at the frontier; its creation time is taken as now.
    pub fn discovered(id: ItemId) -> Self {
        Self::new(id, Utc::now(), ItemOrigin::LiveTail)
    }

    /// Rebuilds a queued item from a delay-queue entry scored in epoch seconds.
    /// Returns `None` when the score is outside the representable range.
    pub fn from_queue_entry(id: ItemId, score: i64) -> Option<Self> {
        DateTime::from_timestamp(score, 0)
            .map(|created_at| Self::new(id, created_at, ItemOrigin::DelayQueue))
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn origin(&self) -> ItemOrigin {
        self.origin
    }
}
