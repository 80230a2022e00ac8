//! The record set and the retrieval logic shared by every store.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use procmem_core::error::MemoryError;
use procmem_core::memory::{MemoryHit, MemoryItem, MemoryQuery};

use crate::{curriculum, ranking};

/// Records keyed by content-addressed id.
#[derive(Debug, Default, Clone)]
pub struct ItemCollection {
    items: BTreeMap<String, MemoryItem>,
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded records; duplicate ids merge like repeated adds.
    pub fn from_items(items: impl IntoIterator<Item = MemoryItem>) -> Self {
        let mut collection = Self::new();
        for item in items {
            collection.upsert(item);
        }
        collection
    }

    /// Insert or merge. Returns the id and whether anything changed.
    pub fn upsert(&mut self, mut item: MemoryItem) -> (String, bool) {
        if !item.has_valid_id() {
            item.id = MemoryItem::compute_id(&item.title, &item.content);
        }
        let id = item.id.clone();
        match self.items.get_mut(&id) {
            Some(existing) => {
                let before = existing.tags.len();
                existing.tags.extend(item.tags);
                (id, existing.tags.len() != before)
            }
            None => {
                self.items.insert(id.clone(), item);
                (id, true)
            }
        }
    }

    pub fn search(&self, query: &MemoryQuery) -> Vec<MemoryHit> {
        if query.k == 0 {
            return Vec::new();
        }

        let candidates: Vec<&MemoryItem> = self
            .items
            .values()
            .filter(|item| {
                query.tags.is_empty() || query.tags.iter().any(|t| item.tags.contains(t))
            })
            .collect();

        let mut ranked: Vec<(&MemoryItem, f32)> = ranking::score_items(&candidates, &query.text)
            .into_iter()
            .map(|(i, score)| (candidates[i], score))
            .collect();

        ranked.sort_by(|(a, sa), (b, sb)| {
            (Reverse(ranking::quantize(*sa)), a.source_type.priority(), &a.id).cmp(&(
                Reverse(ranking::quantize(*sb)),
                b.source_type.priority(),
                &b.id,
            ))
        });

        if let Some(scope) = &query.curriculum {
            ranked = curriculum::reorder(ranked, scope, &query.text);
        }

        ranked
            .into_iter()
            .take(query.k)
            .map(|(item, score)| item.to_hit(score))
            .collect()
    }

    /// Full records in request order, duplicates collapsed.
    pub fn get(&self, ids: &[String], max_n: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        if ids.len() > max_n {
            return Err(MemoryError::BudgetExceeded {
                requested: ids.len(),
                max_n,
            });
        }
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| {
                self.items
                    .get(id)
                    .cloned()
                    .ok_or_else(|| MemoryError::NotFound(id.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every record, in id order.
    pub fn all(&self) -> Vec<MemoryItem> {
        self.items.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.values()
    }

    pub fn delete(&mut self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    /// Returns whether any tag was new.
    pub fn add_tags(&mut self, id: &str, tags: &[String]) -> Result<bool, MemoryError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        let before = item.tags.len();
        item.tags.extend(tags.iter().cloned());
        Ok(item.tags.len() != before)
    }

    pub fn record_outcome(&mut self, id: &str, success: bool) -> Result<(), MemoryError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        if success {
            item.success_count = item.success_count.saturating_add(1);
        } else {
            item.failure_count = item.failure_count.saturating_add(1);
        }
        Ok(())
    }

    /// Lift outcome counters to at least the given values.
    pub fn raise_counters(&mut self, id: &str, success: u32, failure: u32) {
        if let Some(item) = self.items.get_mut(id) {
            item.success_count = item.success_count.max(success);
            item.failure_count = item.failure_count.max(failure);
        }
    }
}
