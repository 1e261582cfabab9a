use crate::support::{
    helpers::{client, init_tracing},
    mock_api::{MockApiServer, MockItems},
};
use anyhow::Result;
use revisit::{ClientError, ItemId};

#[tokio::test]
async fn reads_max_item_and_items_over_http() -> Result<()> {
    init_tracing();
    let items = MockItems::new(25259151);
    items.insert(25259151, 1606783148);
    let server = MockApiServer::start(items.clone()).await?;
    let client = client(server.url(), 3);

    assert_eq!(client.get_max_item_id().await?, ItemId::new(25259151));

    let item = client.get_item(ItemId::new(25259151)).await?;
    assert_eq!(item.id(), ItemId::new(25259151));
    assert_eq!(item.created_at(), 1606783148);
    assert_eq!(item.api_version(), "v0");
    assert!(item.raw().contains("\"type\":\"story\""));

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.total_errors, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn retries_server_errors_within_the_budget() -> Result<()> {
    init_tracing();
    let items = MockItems::new(10);
    items.insert(7, 1606783148);
    items.fail_next(7, 2);
    let server = MockApiServer::start(items.clone()).await?;

    let item = client(server.url(), 3).get_item(ItemId::new(7)).await?;
    assert_eq!(item.id(), ItemId::new(7));
    assert_eq!(items.item_requests(7), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn null_body_counts_as_a_failed_attempt() -> Result<()> {
    init_tracing();
    let items = MockItems::new(10);
    items.mark_absent(8);
    let server = MockApiServer::start(items.clone()).await?;

    let err = client(server.url(), 2)
        .get_item(ItemId::new(8))
        .await
        .expect_err("an item that stays null must fail");
    let client_error = err
        .downcast_ref::<ClientError>()
        .expect("exhaustion surfaces a client error");
    assert_eq!(client_error.status(), Some(200));
    assert_eq!(items.item_requests(8), 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unreachable_server_reports_transport_error() -> Result<()> {
    init_tracing();
    let server = MockApiServer::start(MockItems::new(1)).await?;
    let url = server.url().to_owned();
    server.shutdown().await;

    let err = client(&url, 2)
        .get_max_item_id()
        .await
        .expect_err("nothing is listening any more");
    assert!(matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::Transport { .. })
    ));
    Ok(())
}
