pub mod client;
pub mod model;
pub mod producer;
pub mod queue;
pub mod repository;
pub mod runtime;

pub use client::{ClientError, ClientOptions, ItemClient};
pub use model::{Item, ItemId, ItemOrigin, QueuedItem};
pub use producer::{DelayQueueProducer, LiveTailProducer, Producer, Schedule};
pub use queue::{DelayQueue, DelayStore, MemoryDelayStore, QueueError, RedisDelayStore};
pub use repository::{ItemRepository, MemoryItemRepository, SqliteItemRepository};
pub use runtime::config::{PipelineConfig, PipelineConfigBuilder, StageConfig};
pub use runtime::runner::Runner;
pub use runtime::stage::{StageLoop, StepOutcome};
pub use runtime::telemetry::{init_tracing, StageFailure, Telemetry, TelemetrySnapshot};
