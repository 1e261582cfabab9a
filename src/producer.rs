//! Sources of work for a stage. A stage either tails the frontier of the item
//! API or drains its own delay queue; [`Producer`] is the closed set of both.

pub mod delay_queue;
pub mod live_tail;

pub use delay_queue::{DelayQueueProducer, DEFAULT_GRACE_PERIOD};
pub use live_tail::LiveTailProducer;

use crate::model::QueuedItem;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// When a produced item should be fetched and whether it is already too late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub scheduled: DateTime<Utc>,
    pub expired: bool,
}

impl Schedule {
    pub fn immediate(at: DateTime<Utc>) -> Self {
        Self {
            scheduled: at,
            expired: false,
        }
    }

    /// Time left until `scheduled`, zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.scheduled - now).to_std().unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum Producer {
    LiveTail(LiveTailProducer),
    DelayQueue(DelayQueueProducer),
}

impl Producer {
    pub fn name(&self) -> &str {
        match self {
            Producer::LiveTail(producer) => producer.name(),
            Producer::DelayQueue(producer) => producer.name(),
        }
    }

    /// Waits for the next item this stage should handle.
    pub async fn next(&mut self) -> Result<QueuedItem> {
        match self {
            Producer::LiveTail(producer) => producer.next().await,
            Producer::DelayQueue(producer) => producer.next().await,
        }
    }

    pub fn process_at(&self, item: &QueuedItem) -> Schedule {
        self.process_at_with_now(item, Utc::now())
    }

    pub fn process_at_with_now(&self, item: &QueuedItem, now: DateTime<Utc>) -> Schedule {
        match self {
            Producer::LiveTail(_) => Schedule::immediate(now),
            Producer::DelayQueue(producer) => producer.process_at_with_now(item, now),
        }
    }
}

impl From<LiveTailProducer> for Producer {
    fn from(producer: LiveTailProducer) -> Self {
        Producer::LiveTail(producer)
    }
}

impl From<DelayQueueProducer> for Producer {
    fn from(producer: DelayQueueProducer) -> Self {
        Producer::DelayQueue(producer)
    }
}
