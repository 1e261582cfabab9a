use crate::client::ItemClient;
use crate::producer::{DelayQueueProducer, LiveTailProducer, Producer};
use crate::queue::{DelayQueue, DelayStore};
use crate::repository::ItemRepository;
use crate::runtime::config::PipelineConfig;
use crate::runtime::stage::StageLoop;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs the stages this process serves and handles OS signals for graceful shutdowns.
pub struct Runner {
    config: PipelineConfig,
    served: Vec<String>,
    client: Arc<ItemClient>,
    store: Arc<dyn DelayStore>,
    repository: Arc<dyn ItemRepository>,
    telemetry: HashMap<String, Arc<Telemetry>>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Runner {
    /// Creates a runner for `served`, each of which must be a stage defined in `config`.
    pub fn new(
        config: PipelineConfig,
        served: Vec<String>,
        store: Arc<dyn DelayStore>,
        repository: Arc<dyn ItemRepository>,
    ) -> Result<Self> {
        let client = ItemClient::new(config.client().clone()).context("failed to build item client")?;
        Self::with_client(config, served, Arc::new(client), store, repository)
    }

    /// Same as [`Runner::new`] but reuses an existing client.
    pub fn with_client(
        config: PipelineConfig,
        served: Vec<String>,
        client: Arc<ItemClient>,
        store: Arc<dyn DelayStore>,
        repository: Arc<dyn ItemRepository>,
    ) -> Result<Self> {
        if served.is_empty() {
            bail!("no stages selected to run");
        }
        let mut seen = Vec::with_capacity(served.len());
        for name in &served {
            if config.stage(name).is_none() {
                bail!("no such stage: {name}");
            }
            if seen.contains(&name) {
                bail!("stage {name} selected more than once");
            }
            seen.push(name);
        }

        let telemetry = served
            .iter()
            .map(|name| (name.clone(), Arc::new(Telemetry::default())))
            .collect();

        Ok(Self {
            config,
            served,
            client,
            store,
            repository,
            telemetry,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self, stage: &str) -> Option<Arc<Telemetry>> {
        self.telemetry.get(stage).cloned()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Builds the loop for one served stage: the live tail for the frontier
    /// stage, its own delay queue otherwise, plus the successor's queue.
    fn build_stage(&self, name: &str) -> Result<(StageLoop, Option<DelayQueue>)> {
        let stage = self
            .config
            .stage(name)
            .with_context(|| format!("no such stage: {name}"))?;

        let (producer, input): (Producer, Option<DelayQueue>) = if self.config.is_frontier(name) {
            let producer = LiveTailProducer::new(name, self.client.clone())
                .with_poll_interval(self.config.frontier_poll_interval());
            (producer.into(), None)
        } else {
            let queue = DelayQueue::new(name, self.store.clone());
            let producer = DelayQueueProducer::new(
                queue.clone(),
                stage.process_after(),
                self.config.grace_period(),
            )?;
            (producer.into(), Some(queue))
        };

        let next = stage
            .next()
            .map(|next| DelayQueue::new(next, self.store.clone()));
        let telemetry = self
            .telemetry
            .get(name)
            .cloned()
            .unwrap_or_default();

        let stage_loop = StageLoop::new(producer, self.client.clone(), self.repository.clone(), next)
            .with_telemetry(telemetry);
        Ok((stage_loop, input))
    }

    /// Spawns one loop per served stage, each with its metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let mut stages = Vec::with_capacity(self.served.len());
        for name in &self.served {
            stages.push((name.clone(), self.build_stage(name)?));
        }

        for (name, (stage_loop, input)) in stages {
            let telemetry = stage_loop.telemetry();
            self.tasks
                .push(tokio::spawn(stage_loop.run(self.shutdown.child_token())));
            self.tasks.push(spawn_metrics_reporter(
                name,
                telemetry,
                input,
                self.shutdown.child_token(),
                self.config.metrics_interval(),
            ));
        }

        tracing::info!(stages = ?self.served, "runner started");
        Ok(())
    }

    /// Cancels every stage and waits for the tasks to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        self.shutdown.cancel();
        let mut panicked = 0usize;
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                panicked += 1;
                tracing::error!(error = %err, "stage task failed");
            }
        }
        self.shutdown = CancellationToken::new();

        if panicked > 0 {
            bail!("{panicked} stage task(s) failed during shutdown");
        }
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }
}
