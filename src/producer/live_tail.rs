use crate::client::ItemClient;
use crate::model::{ItemId, QueuedItem};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;

/// Walks the id space from the max item id seen at startup, one id at a time.
///
/// The producer learns the max id lazily on its first [`next`](Self::next) and
/// re-queries it whenever the cursor catches up.
#[derive(Debug)]
pub struct LiveTailProducer {
    name: String,
    client: Arc<ItemClient>,
    poll_interval: Duration,
    cursor: ItemId,
    max: ItemId,
    initialized: bool,
    exhausted: bool,
}

impl LiveTailProducer {
    pub fn new(name: impl Into<String>, client: Arc<ItemClient>) -> Self {
        Self {
            name: name.into(),
            client,
            poll_interval: Duration::ZERO,
            cursor: ItemId::new(0),
            max: ItemId::new(0),
            initialized: false,
            exhausted: false,
        }
    }

    /// Pause between max-id queries while the cursor is ahead of the frontier.
    /// Zero only yields to the scheduler.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next id to be handed out, once initialized and while ids remain.
    pub fn cursor(&self) -> Option<ItemId> {
        (self.initialized && !self.exhausted).then_some(self.cursor)
    }

    /// Fails without querying the API once `i64::MAX` has been handed out.
    pub async fn next(&mut self) -> Result<QueuedItem> {
        if self.exhausted {
            bail!("live tail {} has handed out the last item id", self.name);
        }

        if !self.initialized {
            let max = self.client.get_max_item_id().await?;
            self.cursor = max;
            self.max = max;
            self.initialized = true;
            tracing::info!(stage = %self.name, max_item_id = %max, "live tail starting at frontier");
        }

        while self.cursor > self.max {
            self.wait_for_frontier().await;
            self.max = self.client.get_max_item_id().await?;
        }

        let queued = QueuedItem::discovered(self.cursor);
        match self.cursor.next() {
            Some(next) => self.cursor = next,
            None => self.exhausted = true,
        }
        Ok(queued)
    }

    async fn wait_for_frontier(&self) {
        if self.poll_interval.is_zero() {
            yield_now().await;
        } else {
            sleep(self.poll_interval).await;
        }
    }
}
