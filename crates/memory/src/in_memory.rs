//! In-memory store: useful for tests and ephemeral runs.

use async_trait::async_trait;
use procmem_core::error::MemoryError;
use procmem_core::memory::{MemoryHit, MemoryItem, MemoryQuery, MemoryStore};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collection::ItemCollection;

/// A store that keeps its records in process memory only.
pub struct InMemoryStore {
    items: Arc<RwLock<ItemCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(ItemCollection::new())),
        }
    }

    /// Seed the store with existing records (for example a loaded pack).
    pub fn with_items(items: impl IntoIterator<Item = MemoryItem>) -> Self {
        Self {
            items: Arc::new(RwLock::new(ItemCollection::from_items(items))),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, item: MemoryItem) -> Result<String, MemoryError> {
        let (id, _) = self.items.write().await.upsert(item);
        Ok(id)
    }

    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(self.items.read().await.search(query))
    }

    async fn get(&self, ids: &[String], max_n: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        self.items.read().await.get(ids, max_n)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.items.read().await.len())
    }

    async fn all(&self) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(self.items.read().await.all())
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        Ok(self.items.write().await.delete(id))
    }

    async fn add_tags(&self, id: &str, tags: &[String]) -> Result<(), MemoryError> {
        self.items.write().await.add_tags(id, tags).map(|_| ())
    }

    async fn record_outcome(&self, id: &str, success: bool) -> Result<(), MemoryError> {
        self.items.write().await.record_outcome(id, success)
    }
}
