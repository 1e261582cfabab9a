//! The per-stage processing loop.

use crate::client::ItemClient;
use crate::model::QueuedItem;
use crate::producer::Producer;
use crate::queue::DelayQueue;
use crate::repository::ItemRepository;
use crate::runtime::telemetry::{StageFailure, Telemetry};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const DEFAULT_PRODUCER_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to one produced item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Expired,
    Dropped(StageFailure),
    /// Saved; the stage has no successor.
    Saved,
    /// Saved and pushed into the successor's queue.
    Forwarded,
}

/// Drives one producer: wait until each item is due, fetch it, save it under
/// the stage name and hand it to the next stage.
///
/// Items are handled strictly one after another. Failures are logged and the
/// item is dropped; nothing is ever pushed back into this stage's own queue.
pub struct StageLoop {
    producer: Producer,
    client: Arc<ItemClient>,
    repository: Arc<dyn ItemRepository>,
    next: Option<DelayQueue>,
    telemetry: Arc<Telemetry>,
    producer_backoff: Duration,
}

impl fmt::Debug for StageLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageLoop")
            .field("stage", &self.producer.name())
            .field("next", &self.next.as_ref().map(DelayQueue::name))
            .finish_non_exhaustive()
    }
}

impl StageLoop {
    pub fn new(
        producer: Producer,
        client: Arc<ItemClient>,
        repository: Arc<dyn ItemRepository>,
        next: Option<DelayQueue>,
    ) -> Self {
        Self {
            producer,
            client,
            repository,
            next,
            telemetry: Arc::new(Telemetry::default()),
            producer_backoff: DEFAULT_PRODUCER_BACKOFF,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Pause after a failed `next()` before asking the producer again.
    pub fn with_producer_backoff(mut self, backoff: Duration) -> Self {
        self.producer_backoff = backoff;
        self
    }

    pub fn name(&self) -> &str {
        self.producer.name()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs until `cancel` fires. Every wait in the loop races the token, so
    /// cancellation takes effect at the next suspension point.
    pub async fn run(mut self, cancel: CancellationToken) {
        let stage = self.producer.name().to_owned();
        tracing::info!(
            stage = %stage,
            next = ?self.next.as_ref().map(DelayQueue::name),
            "stage loop started"
        );

        loop {
            let produced = tokio::select! {
                _ = cancel.cancelled() => break,
                produced = self.producer.next() => produced,
            };

            let queued = match produced {
                Ok(queued) => queued,
                Err(err) => {
                    self.telemetry.record_failure(StageFailure::Producer);
                    tracing::warn!(
                        stage = %stage,
                        failure = StageFailure::Producer.as_str(),
                        error = %format!("{err:#}"),
                        "unable to get next item"
                    );
                    if !self.producer_backoff.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(self.producer_backoff) => {}
                        }
                    }
                    continue;
                }
            };
            self.telemetry.record_dequeued();

            let schedule = self.producer.process_at(&queued);
            let wait = schedule.remaining(Utc::now());
            if !wait.is_zero() {
                tracing::debug!(
                    stage = %stage,
                    item_id = %queued.id(),
                    wait_ms = wait.as_millis() as u64,
                    "waiting until item is due"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(wait) => {}
                }
            }

            if schedule.expired {
                self.telemetry.record_expired();
                tracing::info!(
                    stage = %stage,
                    item_id = %queued.id(),
                    scheduled = %schedule.scheduled,
                    "expired item"
                );
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.deliver(&queued) => {}
            }
        }

        tracing::info!(stage = %stage, "stage loop stopped");
    }

    /// Fetches, saves and forwards one due item.
    pub async fn deliver(&self, queued: &QueuedItem) -> StepOutcome {
        let stage = self.producer.name();
        let id = queued.id();

        let item = match self.client.get_item(id).await {
            Ok(item) => item,
            Err(err) => return self.drop_item(StageFailure::Fetch, queued, &err),
        };
        self.telemetry.record_fetched();

        if let Err(err) = self.repository.save(&item, stage).await {
            return self.drop_item(StageFailure::Persist, queued, &err);
        }
        self.telemetry.record_saved();

        let Some(next) = &self.next else {
            tracing::debug!(stage, item_id = %id, "item saved");
            return StepOutcome::Saved;
        };

        match next.push_back(&item).await {
            Ok(()) => {
                self.telemetry.record_forwarded();
                tracing::debug!(stage, item_id = %id, next = next.name(), "item saved and forwarded");
                StepOutcome::Forwarded
            }
            Err(err) => self.drop_item(StageFailure::Forward, queued, &anyhow::Error::new(err)),
        }
    }

    fn drop_item(
        &self,
        failure: StageFailure,
        queued: &QueuedItem,
        err: &anyhow::Error,
    ) -> StepOutcome {
        self.telemetry.record_failure(failure);
        tracing::warn!(
            stage = self.producer.name(),
            item_id = %queued.id(),
            failure = failure.as_str(),
            error = %format!("{err:#}"),
            "dropping item"
        );
        StepOutcome::Dropped(failure)
    }
}
