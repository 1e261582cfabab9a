use super::Schedule;
use crate::model::{Item, QueuedItem};
use crate::queue::{DelayQueue, QueueError};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Slack past the scheduled time before a queued item counts as expired.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Drains a stage's delay queue. Items become due `process_after` past their
/// source creation time and expire once they are more than the grace period
/// late.
#[derive(Debug, Clone)]
pub struct DelayQueueProducer {
    queue: DelayQueue,
    process_after: TimeDelta,
    grace_period: TimeDelta,
}

impl DelayQueueProducer {
    pub fn new(queue: DelayQueue, process_after: Duration, grace_period: Duration) -> Result<Self> {
        let process_after = TimeDelta::from_std(process_after)
            .with_context(|| format!("process_after for {} is out of range", queue.name()))?;
        let grace_period = TimeDelta::from_std(grace_period)
            .with_context(|| format!("grace_period for {} is out of range", queue.name()))?;
        Ok(Self {
            queue,
            process_after,
            grace_period,
        })
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub async fn push_back(&self, item: &Item) -> Result<(), QueueError> {
        self.queue.push_back(item).await
    }

    pub async fn next(&mut self) -> Result<QueuedItem> {
        Ok(self.queue.pop_next().await?)
    }

    pub fn process_at_with_now(&self, item: &QueuedItem, now: DateTime<Utc>) -> Schedule {
        let scheduled = item
            .created_at()
            .checked_add_signed(self.process_after)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let deadline = scheduled
            .checked_add_signed(self.grace_period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Schedule {
            scheduled,
            expired: deadline < now,
        }
    }
}
