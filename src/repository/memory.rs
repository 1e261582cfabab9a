use super::ItemRepository;
use crate::model::Item;
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
struct SavedItem {
    stage: String,
    item: Item,
}

/// Keeps saved items in memory. Used for dry runs and tests; can be switched
/// into a failing mode to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryItemRepository {
    saved: Mutex<Vec<SavedItem>>,
    failing: AtomicBool,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved_for(&self, stage: &str) -> Vec<Item> {
        self.lock()
            .iter()
            .filter(|saved| saved.stage == stage)
            .map(|saved| saved.item.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SavedItem>> {
        match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ItemRepository for MemoryItemRepository {
    fn save<'a>(&'a self, item: &'a Item, stage: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                bail!("repository unavailable");
            }
            self.lock().push(SavedItem {
                stage: stage.to_owned(),
                item: item.clone(),
            });
            Ok(())
        })
    }
}
