use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{client_options, init_tracing, wait_until, wait_until_async},
    mock_api::{MockApiServer, MockItems},
};
use anyhow::Result;
use chrono::Utc;
use revisit::{
    DelayQueue, DelayStore, Item, ItemId, MemoryDelayStore, MemoryItemRepository, PipelineConfig,
    Runner, SqliteItemRepository,
};

fn zero_delay_chain(base_url: &str) -> Result<PipelineConfig> {
    PipelineConfig::builder()
        .client(client_options(base_url, 3))
        .stage("new", Duration::ZERO, Some("queue:a"))
        .stage("queue:a", Duration::ZERO, Some("queue:b"))
        .stage("queue:b", Duration::ZERO, None)
        .frontier_poll_interval(Duration::from_millis(10))
        .metrics_interval(Duration::from_millis(100))
        .build()
}

fn served(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn items_flow_from_the_frontier_through_every_stage() -> Result<()> {
    init_tracing();
    let now = Utc::now().timestamp();
    let items = MockItems::new(100);
    for id in 100..=102 {
        items.insert(id, now);
    }
    let server = MockApiServer::start(items.clone()).await?;

    let store = Arc::new(MemoryDelayStore::new());
    let repository = Arc::new(MemoryItemRepository::new());
    let mut runner = Runner::new(
        zero_delay_chain(server.url())?,
        served(&["new", "queue:a", "queue:b"]),
        store.clone(),
        repository.clone(),
    )?;
    runner.start().await?;

    wait_until("frontier item saved", Duration::from_secs(5), || {
        !repository.saved_for("new").is_empty()
    })
    .await?;
    items.set_max_item(102);

    wait_until("three items saved by every stage", Duration::from_secs(10), || {
        repository.saved_for("queue:b").len() == 3
    })
    .await?;
    runner.stop().await?;

    for stage in ["new", "queue:a", "queue:b"] {
        let mut ids: Vec<i64> = repository
            .saved_for(stage)
            .iter()
            .map(|item| item.id().get())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![100, 101, 102], "stage {stage}");
    }

    // forwarding keeps the source creation time
    assert!(repository
        .saved_for("queue:b")
        .iter()
        .all(|item| item.created_at() == now));
    assert!(store.is_empty("queue:a").await);
    assert!(store.is_empty("queue:b").await);

    let frontier = runner.telemetry("new").expect("frontier telemetry");
    assert_eq!(frontier.snapshot().forwarded, 3);
    let terminal = runner.telemetry("queue:b").expect("terminal telemetry");
    assert_eq!(terminal.snapshot().forwarded, 0);
    assert_eq!(terminal.snapshot().saved, 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn expired_entries_are_discarded_without_fetching() -> Result<()> {
    init_tracing();
    let now = Utc::now().timestamp();
    let items = MockItems::new(10);
    items.insert(1, now - 7200);
    items.insert(2, now);
    let server = MockApiServer::start(items.clone()).await?;

    let store: Arc<dyn DelayStore> = Arc::new(MemoryDelayStore::new());
    let queue = DelayQueue::new("queue:b", store.clone());
    for (id, created) in [(1, now - 7200), (2, now)] {
        let item = Item::from_payload(ItemId::new(id), "v0", format!(r#"{{"time":{created}}}"#))?;
        queue.push_back(&item).await?;
    }

    let repository = Arc::new(MemoryItemRepository::new());
    let mut runner = Runner::new(
        zero_delay_chain(server.url())?,
        served(&["queue:b"]),
        store,
        repository.clone(),
    )?;
    runner.start().await?;

    wait_until("fresh item saved", Duration::from_secs(5), || {
        repository.saved_for("queue:b").len() == 1
    })
    .await?;
    runner.stop().await?;

    assert_eq!(repository.saved_for("queue:b")[0].id(), ItemId::new(2));
    assert_eq!(items.item_requests(1), 0);
    let snapshot = runner.telemetry("queue:b").expect("telemetry").snapshot();
    assert_eq!(snapshot.expired, 1);
    assert_eq!(snapshot.saved, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn delay_stage_persists_to_sqlite() -> Result<()> {
    init_tracing();
    let now = Utc::now().timestamp();
    let items = MockItems::new(10);
    items.insert(4, now);
    let server = MockApiServer::start(items.clone()).await?;

    let store: Arc<dyn DelayStore> = Arc::new(MemoryDelayStore::new());
    let queue = DelayQueue::new("queue:a", store.clone());
    queue
        .push_back(&Item::from_payload(ItemId::new(4), "v0", format!(r#"{{"time":{now}}}"#))?)
        .await?;

    let repository = Arc::new(SqliteItemRepository::connect("sqlite::memory:").await?);
    let mut runner = Runner::new(
        zero_delay_chain(server.url())?,
        served(&["queue:a"]),
        store.clone(),
        repository.clone(),
    )?;
    runner.start().await?;

    let next = DelayQueue::new("queue:b", store);
    wait_until_async("item forwarded to queue:b", Duration::from_secs(5), || {
        let next = next.clone();
        async move { next.pending().await.unwrap_or(0) == 1 }
    })
    .await?;
    runner.stop().await?;

    assert_eq!(repository.count_for_stage("queue:a").await?, 1);
    assert_eq!(repository.count_for_stage("queue:b").await?, 0);

    server.shutdown().await;
    Ok(())
}
