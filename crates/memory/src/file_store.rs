//! File-backed store: persistent JSON-lines storage.
//!
//! Records are loaded into memory on open and the whole file is rewritten on
//! every mutation that changes something. The write lock is held across the
//! flush so concurrent writers cannot interleave partial files, and each
//! flush goes through a temp file and a rename so a crash never leaves a
//! truncated pack behind. A mutation is applied to a copy and only becomes
//! visible once its flush succeeds.
//!
//! Storage location: `~/.procmem/memory.jsonl` unless configured.

use async_trait::async_trait;
use procmem_core::error::MemoryError;
use procmem_core::memory::{MemoryHit, MemoryItem, MemoryQuery, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::collection::ItemCollection;
use crate::pack;

/// A file-backed memory store using JSONL (one record per line).
pub struct FileStore {
    path: PathBuf,
    items: Arc<RwLock<ItemCollection>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (it is created on first write). Corrupt
    /// lines are skipped with a warning. Other read failures are errors, so
    /// an unreadable file is never silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(content) => pack::parse_pack(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read memory file {}: {e}",
                    path.display()
                )));
            }
        };
        let items = ItemCollection::from_items(items);
        debug!(path = %path.display(), count = items.len(), "File memory store loaded");
        Ok(Self {
            path,
            items: Arc::new(RwLock::new(items)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, items: &ItemCollection) -> Result<(), MemoryError> {
        pack::write_pack(&self.path, items.iter())?;
        debug!(path = %self.path.display(), count = items.len(), "Memory file flushed");
        Ok(())
    }

    /// Run `f` on a copy of the collection. When it reports a change the
    /// copy is flushed and swapped in; on any error memory is untouched.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ItemCollection) -> Result<(T, bool), MemoryError>,
    ) -> Result<T, MemoryError> {
        let mut items = self.items.write().await;
        let mut next = items.clone();
        let (value, changed) = f(&mut next)?;
        if changed {
            self.flush(&next)?;
            *items = next;
        }
        Ok(value)
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn add(&self, item: MemoryItem) -> Result<String, MemoryError> {
        self.mutate(|items| Ok(items.upsert(item))).await
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
        self.mutate(|items| {
            let removed = items.delete(id);
            Ok((removed, removed))
        })
        .await
    }

    async fn add_tags(&self, id: &str, tags: &[String]) -> Result<(), MemoryError> {
        self.mutate(|items| Ok(((), items.add_tags(id, tags)?))).await
    }

    async fn record_outcome(&self, id: &str, success: bool) -> Result<(), MemoryError> {
        self.mutate(|items| {
            items.record_outcome(id, success)?;
            Ok(((), true))
        })
        .await
    }
}
