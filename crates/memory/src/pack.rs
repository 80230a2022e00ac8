//! Memory packs: the JSONL interchange format.
//!
//! One record per line, sorted by id, so packs diff cleanly under version
//! control. Reading is lenient: corrupt lines are skipped with a warning and
//! records whose id does not match their content are re-keyed.

use std::path::Path;

use procmem_core::error::MemoryError;
use procmem_core::memory::MemoryItem;
use tracing::warn;

use crate::collection::ItemCollection;

/// Parse pack text, skipping corrupt lines.
pub fn parse_pack(content: &str) -> Vec<MemoryItem> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<MemoryItem>(line) {
            Ok(mut item) => {
                if !item.has_valid_id() {
                    let id = MemoryItem::compute_id(&item.title, &item.content);
                    warn!(line = n + 1, old_id = %item.id, new_id = %id, "Re-keying memory record");
                    item.id = id;
                }
                Some(item)
            }
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping corrupted memory record");
                None
            }
        })
        .collect()
}

/// Read a pack file. A missing file is an error here; stores treat it as empty.
pub fn read_pack(path: &Path) -> Result<Vec<MemoryItem>, MemoryError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MemoryError::Storage(format!("Failed to read pack {}: {e}", path.display()))
    })?;
    Ok(parse_pack(&content))
}

/// Render records as JSONL, sorted by id.
pub fn render_pack<'a>(
    items: impl IntoIterator<Item = &'a MemoryItem>,
) -> Result<String, MemoryError> {
    let mut items: Vec<&MemoryItem> = items.into_iter().collect();
    items.sort_by(|a, b| a.id.cmp(&b.id));

    let mut content = String::new();
    for item in items {
        let line = serde_json::to_string(item).map_err(|e| {
            MemoryError::Serialization(format!("Failed to serialize memory record: {e}"))
        })?;
        content.push_str(&line);
        content.push('\n');
    }
    Ok(content)
}

/// Write a pack atomically: temp file in the same directory, then rename.
pub fn write_pack<'a>(
    path: &Path,
    items: impl IntoIterator<Item = &'a MemoryItem>,
) -> Result<(), MemoryError> {
    let content = render_pack(items)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::Storage(format!("Failed to create memory directory: {e}"))
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, &content)
        .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| MemoryError::Storage(format!("Failed to replace memory file: {e}")))?;
    Ok(())
}

/// Union of two record sets. Tags are unioned and outcome counters take the
/// larger of the two sides; everything else comes from `base`.
pub fn merge_packs(base: Vec<MemoryItem>, incoming: Vec<MemoryItem>) -> Vec<MemoryItem> {
    let mut merged = ItemCollection::from_items(base);
    for item in incoming {
        let (success, failure) = (item.success_count, item.failure_count);
        let (id, _) = merged.upsert(item);
        merged.raise_counters(&id, success, failure);
    }
    merged.all()
}
