use super::store::{DelayStore, QueueError};
use crate::model::ItemId;
use ::redis::aio::{ConnectionManager, MultiplexedConnection};
use ::redis::{Client, RedisError};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type BlockingSlot = Arc<Mutex<Option<MultiplexedConnection>>>;

/// Delay store on Redis sorted sets: `ZADD` to schedule, `BZPOPMIN <queue> 0`
/// to take the earliest entry.
///
/// Writes share one managed connection. Each queue gets its own connection for
/// the blocking pop since a pending `BZPOPMIN` holds its connection until an
/// entry arrives.
pub struct RedisDelayStore {
    client: Client,
    writer: ConnectionManager,
    blocking: StdMutex<HashMap<String, BlockingSlot>>,
}

impl RedisDelayStore {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = Client::open(url).map_err(|err| QueueError::Connection(err.to_string()))?;
        let writer = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| QueueError::Connection(err.to_string()))?;
        debug!(url = %redact(url), "connected to redis delay store");
        Ok(Self {
            client,
            writer,
            blocking: StdMutex::new(HashMap::new()),
        })
    }

    fn blocking_slot(&self, queue: &str) -> BlockingSlot {
        let mut slots = match self.blocking.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(queue.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn blocking_pop(&self, queue: &str) -> Result<(ItemId, i64), QueueError> {
        let slot = self.blocking_slot(queue);
        let mut guard = slot.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|err| QueueError::Connection(err.to_string()))?,
        };

        let reply: Result<Option<(String, String, f64)>, RedisError> = ::redis::cmd("BZPOPMIN")
            .arg(queue)
            .arg(0)
            .query_async(&mut conn)
            .await;

        let (_, member, score) = match reply {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                *guard = Some(conn);
                return Err(QueueError::Command {
                    queue: queue.to_owned(),
                    message: "BZPOPMIN returned no entry".into(),
                });
            }
            Err(err) => {
                // The connection is dropped; the next pop reconnects.
                warn!(queue, error = %err, "blocking pop failed");
                return Err(command_error(queue, err));
            }
        };
        *guard = Some(conn);

        let member: ItemId = member.parse().map_err(|err: anyhow::Error| QueueError::Decode {
            queue: queue.to_owned(),
            message: format!("{err:#}"),
        })?;
        Ok((member, score as i64))
    }
}

impl DelayStore for RedisDelayStore {
    fn upsert<'a>(
        &'a self,
        queue: &'a str,
        member: ItemId,
        score: i64,
    ) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let mut conn = self.writer.clone();
            let _added: i64 = ::redis::cmd("ZADD")
                .arg(queue)
                .arg(score)
                .arg(member.get())
                .query_async(&mut conn)
                .await
                .map_err(|err| command_error(queue, err))?;
            Ok(())
        })
    }

    fn pop_min<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<(ItemId, i64), QueueError>> {
        Box::pin(self.blocking_pop(queue))
    }

    fn pending<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<usize, QueueError>> {
        Box::pin(async move {
            let mut conn = self.writer.clone();
            let count: usize = ::redis::cmd("ZCARD")
                .arg(queue)
                .query_async(&mut conn)
                .await
                .map_err(|err| command_error(queue, err))?;
            Ok(count)
        })
    }
}

fn command_error(queue: &str, err: RedisError) -> QueueError {
    QueueError::Command {
        queue: queue.to_owned(),
        message: err.to_string(),
    }
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_owned(),
    }
}
