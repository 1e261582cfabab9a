use anyhow::{bail, Context, Result};
use revisit::{
    init_tracing, DelayStore, MemoryDelayStore, PipelineConfig, RedisDelayStore, Runner,
    SqliteItemRepository,
};
use std::env;
use std::sync::Arc;

const STAGES_VAR: &str = "REVISIT_STAGES";
const DATABASE_URL_VAR: &str = "REVISIT_DATABASE_URL";
const QUEUE_URL_VAR: &str = "REVISIT_QUEUE_URL";
const CONFIG_VAR: &str = "REVISIT_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let stages = parse_stages(&required_env(STAGES_VAR)?)?;
    let database_url = required_env(DATABASE_URL_VAR)?;
    let queue_url = required_env(QUEUE_URL_VAR)?;

    let config = match env::var(CONFIG_VAR) {
        Ok(path) if !path.trim().is_empty() => PipelineConfig::from_yaml_file(path.trim())?,
        _ => PipelineConfig::default_chain()?,
    };

    let repository = SqliteItemRepository::connect(&database_url).await?;
    let store = connect_store(&queue_url).await?;

    let mut runner = Runner::new(config, stages, store, Arc::new(repository))?;
    runner.run_until_ctrl_c().await
}

fn required_env(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| format!("environment variable {key} is not set"))?;
    if value.trim().is_empty() {
        bail!("environment variable {key} is empty");
    }
    Ok(value.trim().to_owned())
}

fn parse_stages(value: &str) -> Result<Vec<String>> {
    let stages: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    if stages.is_empty() {
        bail!("{STAGES_VAR} does not name any stage");
    }
    Ok(stages)
}

async fn connect_store(url: &str) -> Result<Arc<dyn DelayStore>> {
    if url.starts_with("memory://") {
        tracing::warn!("using in-process delay store; queued items are lost on exit");
        return Ok(Arc::new(MemoryDelayStore::new()));
    }
    if url.starts_with("redis://") {
        let store = RedisDelayStore::connect(url)
            .await
            .context("failed to connect to delay store")?;
        return Ok(Arc::new(store));
    }
    bail!("{QUEUE_URL_VAR} must start with redis:// or memory://")
}
