use crate::model::ItemId;
use futures::future::BoxFuture;
use std::fmt;

#[derive(Debug)]
pub enum QueueError {
    Connection(String),
    Command { queue: String, message: String },
    Decode { queue: String, message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Connection(message) => write!(f, "delay store connection error: {message}"),
            QueueError::Command { queue, message } => {
                write!(f, "delay store command on {queue} failed: {message}")
            }
            QueueError::Decode { queue, message } => {
                write!(f, "invalid entry in delay queue {queue}: {message}")
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// Backing store for delay queues.
///
/// Both operations must be atomic with respect to every other client of the
/// store: stages running in separate processes coordinate only through them.
pub trait DelayStore: Send + Sync {
    /// Inserts `member` into `queue` with `score`, replacing the score of an
    /// existing member.
    fn upsert<'a>(
        &'a self,
        queue: &'a str,
        member: ItemId,
        score: i64,
    ) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Removes and returns the lowest-scored member of `queue`, waiting for as
    /// long as it takes for one to appear.
    fn pop_min<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<(ItemId, i64), QueueError>>;

    /// Number of members currently waiting in `queue`.
    fn pending<'a>(&'a self, queue: &'a str) -> BoxFuture<'a, Result<usize, QueueError>>;
}
