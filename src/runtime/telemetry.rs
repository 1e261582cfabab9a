use crate::queue::DelayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Which step of the stage loop a failure surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFailure {
    Producer,
    Fetch,
    Persist,
    Forward,
}

impl StageFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            StageFailure::Producer => "producer",
            StageFailure::Fetch => "fetch",
            StageFailure::Persist => "persist",
            StageFailure::Forward => "forward",
        }
    }
}

/// Per-stage counters.
#[derive(Default, Debug)]
pub struct Telemetry {
    dequeued: AtomicU64,
    expired: AtomicU64,
    fetched: AtomicU64,
    saved: AtomicU64,
    forwarded: AtomicU64,
    producer_failures: AtomicU64,
    fetch_failures: AtomicU64,
    persist_failures: AtomicU64,
    forward_failures: AtomicU64,
}

impl Telemetry {
    pub fn record_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, failure: StageFailure) {
        let counter = match failure {
            StageFailure::Producer => &self.producer_failures,
            StageFailure::Fetch => &self.fetch_failures,
            StageFailure::Persist => &self.persist_failures,
            StageFailure::Forward => &self.forward_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            dequeued: self.dequeued.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            producer_failures: self.producer_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub dequeued: u64,
    pub expired: u64,
    pub fetched: u64,
    pub saved: u64,
    pub forwarded: u64,
    pub producer_failures: u64,
    pub fetch_failures: u64,
    pub persist_failures: u64,
    pub forward_failures: u64,
}

impl TelemetrySnapshot {
    pub fn failures(&self) -> u64 {
        self.producer_failures + self.fetch_failures + self.persist_failures + self.forward_failures
    }
}

/// Spawns a background task that periodically logs a stage's save rate,
/// counters and, for delay-queue stages, the number of entries still waiting.
pub fn spawn_metrics_reporter(
    stage: String,
    telemetry: Arc<Telemetry>,
    queue: Option<DelayQueue>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "revisit::metrics", stage = %stage, "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let saved_delta = current_snapshot.saved.saturating_sub(last_snapshot.saved);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        saved_delta as f64 / elapsed
                    };
                    let pending = match &queue {
                        Some(queue) => queue.pending().await.ok(),
                        None => None,
                    };

                    tracing::info!(
                        target: "revisit::metrics",
                        stage = %stage,
                        throughput = format!("{throughput:.2}"),
                        dequeued = current_snapshot.dequeued,
                        expired = current_snapshot.expired,
                        saved = current_snapshot.saved,
                        forwarded = current_snapshot.forwarded,
                        failures = current_snapshot.failures(),
                        pending = ?pending,
                        "stage metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
