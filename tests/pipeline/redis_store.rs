use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{init_tracing, redis_test_url, unique_queue};
use anyhow::Result;
use revisit::{DelayQueue, DelayStore, Item, ItemId, ItemOrigin, RedisDelayStore};
use tokio::time::timeout;

const POP_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(test: &str) -> Result<Option<RedisDelayStore>> {
    init_tracing();
    let Some(url) = redis_test_url() else {
        tracing::info!("skipping {test} (set REVISIT_REDIS_URL=redis://...)");
        return Ok(None);
    };
    Ok(Some(RedisDelayStore::connect(&url).await?))
}

async fn pop(store: &RedisDelayStore, queue: &str) -> Result<(ItemId, i64)> {
    Ok(timeout(POP_TIMEOUT, store.pop_min(queue)).await??)
}

#[tokio::test]
async fn redis_pops_by_score_regardless_of_push_order() -> Result<()> {
    let Some(store) = connect("redis_pops_by_score_regardless_of_push_order").await? else {
        return Ok(());
    };
    let queue = unique_queue("order");

    for (id, score) in [(1, 10), (2, 30), (3, 20)] {
        store.upsert(&queue, ItemId::new(id), score).await?;
    }
    assert_eq!(store.pending(&queue).await?, 3);

    let mut popped = Vec::new();
    for _ in 0..3 {
        let (id, score) = pop(&store, &queue).await?;
        popped.push((id.get(), score));
    }
    assert_eq!(popped, vec![(1, 10), (3, 20), (2, 30)]);
    assert_eq!(store.pending(&queue).await?, 0);
    Ok(())
}

#[tokio::test]
async fn redis_upsert_replaces_the_score_of_a_waiting_member() -> Result<()> {
    let Some(store) = connect("redis_upsert_replaces_the_score_of_a_waiting_member").await? else {
        return Ok(());
    };
    let queue = unique_queue("upsert");

    store.upsert(&queue, ItemId::new(1), 50).await?;
    store.upsert(&queue, ItemId::new(2), 20).await?;
    store.upsert(&queue, ItemId::new(1), 10).await?;
    assert_eq!(store.pending(&queue).await?, 2);

    assert_eq!(pop(&store, &queue).await?, (ItemId::new(1), 10));
    assert_eq!(pop(&store, &queue).await?, (ItemId::new(2), 20));
    assert_eq!(store.pending(&queue).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redis_blocked_pop_wakes_on_a_later_push() -> Result<()> {
    let Some(store) = connect("redis_blocked_pop_wakes_on_a_later_push").await? else {
        return Ok(());
    };
    let store = Arc::new(store);
    let queue = unique_queue("blocking");

    let waiter = {
        let store = store.clone();
        let queue = queue.clone();
        tokio::spawn(async move { store.pop_min(&queue).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished(), "pop must block on an empty queue");

    // written through the shared writer while the pop holds its own connection
    store.upsert(&queue, ItemId::new(77), 1606783148).await?;
    let popped = timeout(POP_TIMEOUT, waiter).await???;
    assert_eq!(popped, (ItemId::new(77), 1606783148));

    // the per-queue blocking connection is reused for the next pop
    store.upsert(&queue, ItemId::new(78), 1606783149).await?;
    assert_eq!(pop(&store, &queue).await?, (ItemId::new(78), 1606783149));
    Ok(())
}

#[tokio::test]
async fn redis_delay_queue_round_trips_items() -> Result<()> {
    let Some(store) = connect("redis_delay_queue_round_trips_items").await? else {
        return Ok(());
    };
    let queue = DelayQueue::new(unique_queue("delay"), Arc::new(store));

    for (id, created) in [(101, 1606783300), (102, 1606783100)] {
        let item = Item::from_payload(ItemId::new(id), "v0", format!(r#"{{"time":{created}}}"#))?;
        queue.push_back(&item).await?;
    }
    assert_eq!(queue.pending().await?, 2);

    let first = timeout(POP_TIMEOUT, queue.pop_next()).await??;
    assert_eq!(first.id(), ItemId::new(102));
    assert_eq!(first.created_at().timestamp(), 1606783100);
    assert_eq!(first.origin(), ItemOrigin::DelayQueue);

    let second = timeout(POP_TIMEOUT, queue.pop_next()).await??;
    assert_eq!(second.id(), ItemId::new(101));
    assert_eq!(queue.pending().await?, 0);
    Ok(())
}
