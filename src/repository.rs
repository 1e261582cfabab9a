//! Durable storage for fetched items.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryItemRepository;
pub use sqlite::SqliteItemRepository;

use crate::model::Item;
use anyhow::Result;
use futures::future::BoxFuture;

/// Persists every successfully fetched item, tagged with the stage that
/// captured it. The same item id is saved once per stage it passes through.
pub trait ItemRepository: Send + Sync {
    fn save<'a>(&'a self, item: &'a Item, stage: &'a str) -> BoxFuture<'a, Result<()>>;
}
