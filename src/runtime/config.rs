use crate::client::ClientOptions;
use crate::producer::DEFAULT_GRACE_PERIOD;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Stage fed by the live tail of the item API unless configured otherwise.
pub const DEFAULT_FRONTIER_STAGE: &str = "new";

/// One stage of the pipeline: when its items become due and where they go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    name: String,
    process_after: Duration,
    next: Option<String>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, process_after: Duration, next: Option<String>) -> Self {
        Self {
            name: name.into(),
            process_after,
            next,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delay after the item's creation time before this stage fetches it.
    pub fn process_after(&self) -> Duration {
        self.process_after
    }

    /// Stage whose queue receives items after this stage saved them.
    pub fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}

/// Runtime configuration for the whole pipeline.
///
/// Instances are built via [`PipelineConfig::builder`], [`PipelineConfig::from_yaml_str`]
/// or [`PipelineConfig::default_chain`], all of which validate before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    client: ClientOptions,
    stages: Vec<StageConfig>,
    frontier_stage: String,
    grace_period: Duration,
    frontier_poll_interval: Duration,
    metrics_interval: Duration,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// `new` (immediately) → `queue:15m` → `queue:30m` → `queue:1h`.
    pub fn default_chain() -> Result<Self> {
        Self::builder()
            .stage(DEFAULT_FRONTIER_STAGE, Duration::ZERO, Some("queue:15m"))
            .stage("queue:15m", Duration::from_secs(15 * 60), Some("queue:30m"))
            .stage("queue:30m", Duration::from_secs(30 * 60), Some("queue:1h"))
            .stage("queue:1h", Duration::from_secs(60 * 60), None)
            .build()
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(source).context("failed to parse pipeline config")?;
        file.into_config()
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&source)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn client(&self) -> &ClientOptions {
        &self.client
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Name of the stage driven by the live tail instead of a delay queue.
    pub fn frontier_stage(&self) -> &str {
        &self.frontier_stage
    }

    pub fn is_frontier(&self, name: &str) -> bool {
        self.frontier_stage == name
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn frontier_poll_interval(&self) -> Duration {
        self.frontier_poll_interval
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn validate(&self) -> Result<()> {
        self.client.validate().context("invalid client options")?;

        if self.stages.is_empty() {
            bail!("at least one stage must be configured");
        }

        let mut names = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                bail!("stage names cannot be empty");
            }
            if !names.insert(stage.name.as_str()) {
                bail!("stage {} is defined more than once", stage.name);
            }
        }

        for stage in &self.stages {
            if let Some(next) = stage.next() {
                if next == stage.name {
                    bail!("stage {} cannot forward to itself", stage.name);
                }
                if !names.contains(next) {
                    bail!("stage {} forwards to undefined stage {next}", stage.name);
                }
            }
        }

        if !names.contains(self.frontier_stage.as_str()) {
            bail!("frontier stage {} is not defined", self.frontier_stage);
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineConfigBuilder {
    client: Option<ClientOptions>,
    stages: Vec<StageConfig>,
    frontier_stage: Option<String>,
    grace_period: Option<Duration>,
    frontier_poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl PipelineConfigBuilder {
    pub fn client(mut self, client: ClientOptions) -> Self {
        self.client = Some(client);
        self
    }

    /// Appends a stage; stages keep the order they were added in.
    pub fn stage(
        mut self,
        name: impl Into<String>,
        process_after: Duration,
        next: Option<&str>,
    ) -> Self {
        self.stages
            .push(StageConfig::new(name, process_after, next.map(str::to_owned)));
        self
    }

    pub fn frontier_stage(mut self, name: impl Into<String>) -> Self {
        self.frontier_stage = Some(name.into());
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = Some(grace_period);
        self
    }

    pub fn frontier_poll_interval(mut self, interval: Duration) -> Self {
        self.frontier_poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let config = PipelineConfig {
            client: self.client.unwrap_or_default(),
            stages: self.stages,
            frontier_stage: self
                .frontier_stage
                .unwrap_or_else(|| DEFAULT_FRONTIER_STAGE.to_owned()),
            grace_period: self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
            frontier_poll_interval: self.frontier_poll_interval.unwrap_or(Duration::ZERO),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    client: ClientOptions,
    channels: serde_yaml::Mapping,
    frontier_stage: Option<String>,
    #[serde(default, with = "humantime_serde")]
    grace_period: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    frontier_poll_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    metrics_interval: Option<Duration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChannelFile {
    #[serde(with = "humantime_serde")]
    process_after: Duration,
    #[serde(default)]
    next: Option<String>,
}

impl ConfigFile {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder().client(self.client);

        // Mapping keeps the file's key order.
        for (key, value) in self.channels {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                other => bail!("channel names must be strings, found {other:?}"),
            };
            let channel: ChannelFile = serde_yaml::from_value(value)
                .with_context(|| format!("invalid channel {name}"))?;
            builder = builder.stage(name, channel.process_after, channel.next.as_deref());
        }

        if let Some(frontier) = self.frontier_stage {
            builder = builder.frontier_stage(frontier);
        }
        if let Some(grace_period) = self.grace_period {
            builder = builder.grace_period(grace_period);
        }
        if let Some(interval) = self.frontier_poll_interval {
            builder = builder.frontier_poll_interval(interval);
        }
        if let Some(interval) = self.metrics_interval {
            builder = builder.metrics_interval(interval);
        }

        builder.build()
    }
}
