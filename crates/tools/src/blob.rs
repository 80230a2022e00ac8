//! Blob store: session-scoped storage behind handles.
//!
//! Large tool outputs land here and the model only ever sees a `Ref`.
//! Reads go through bounded accessors (`peek`, `slice`, `stats`); `get`
//! returns the full payload and is meant for tool implementations, not for
//! echoing back to the model.
//!
//! One store per run. Nothing here is process-global.

use procmem_core::error::BlobError;
use procmem_core::handle::{MAX_DTYPE_CHARS, Ref};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Default number of characters returned by `peek`.
pub const DEFAULT_PEEK_CHARS: usize = 200;

/// Size summary for a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStats {
    /// Length in characters.
    pub size: usize,
    pub line_count: usize,
}

/// Keys are `{dtype}_{n}` with the dtype reduced to `[a-z0-9_]`.
fn sanitize_dtype(dtype: &str) -> String {
    let cleaned: String = dtype
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(MAX_DTYPE_CHARS)
        .collect();
    if cleaned.is_empty() {
        "blob".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<String, String>>,
    counter: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` under a fresh key and return its handle.
    pub fn put(&self, content: impl Into<String>, dtype: &str) -> Ref {
        let content = content.into();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}_{n}", sanitize_dtype(dtype));
        let handle = Ref::new(key.clone(), dtype, &content);
        debug!(key = %key, size = handle.size, "Blob stored");
        self.blobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, content);
        handle
    }

    fn with_blob<T>(&self, key: &str, f: impl FnOnce(&str) -> T) -> Result<T, BlobError> {
        let blobs = self
            .blobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        blobs
            .get(key)
            .map(|content| f(content))
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    /// The full payload.
    pub fn get(&self, key: &str) -> Result<String, BlobError> {
        self.with_blob(key, str::to_string)
    }

    /// The first `n` characters.
    pub fn peek(&self, key: &str, n: usize) -> Result<String, BlobError> {
        self.with_blob(key, |content| content.chars().take(n).collect())
    }

    /// Characters `start..end`, clamped to the content; empty when
    /// `start >= end`.
    pub fn slice(&self, key: &str, start: usize, end: usize) -> Result<String, BlobError> {
        self.with_blob(key, |content| {
            if start >= end {
                return String::new();
            }
            content.chars().skip(start).take(end - start).collect()
        })
    }

    pub fn stats(&self, key: &str) -> Result<BlobStats, BlobError> {
        self.with_blob(key, |content| BlobStats {
            size: content.chars().count(),
            line_count: content.lines().count(),
        })
    }

    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_returns_bounded_ref() {
        let store = BlobStore::new();
        let r = store.put("hello\nworld", "text");
        assert_eq!(r.key, "text_0");
        assert_eq!(r.size, 11);
        assert_eq!(r.preview, "hello\nworld");
    }

    #[test]
    fn keys_are_unique_and_sanitized() {
        let store = BlobStore::new();
        let a = store.put("a", "SPARQL Results!");
        let b = store.put("b", "SPARQL Results!");
        assert_ne!(a.key, b.key);
        assert!(a.key.starts_with("sparql_results__"));
        let long = store.put("c", &"x".repeat(100));
        assert!(long.key.len() <= MAX_DTYPE_CHARS + 1 + 20);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn size_counts_characters() {
        let store = BlobStore::new();
        let r = store.put("héllo wörld", "text");
        assert_eq!(r.size, 11);
        assert_eq!(store.stats(&r.key).unwrap().size, 11);
    }

    #[test]
    fn large_payload_stays_behind_the_handle() {
        let store = BlobStore::new();
        let content = "0123456789\n".repeat(50_000).chars().take(500_000).collect::<String>();
        let r = store.put(content.clone(), "results");

        assert_eq!(r.size, 500_000);
        assert!(r.to_string().chars().count() < 200);
        assert_eq!(store.peek(&r.key, 100).unwrap().chars().count(), 100);
        assert_eq!(store.slice(&r.key, 1000, 1100).unwrap(), content[1000..1100]);
        assert_eq!(store.stats(&r.key).unwrap().line_count, 45_455);
        assert_eq!(store.get(&r.key).unwrap().len(), 500_000);
    }

    #[test]
    fn half_million_char_blob_is_read_in_bounded_pieces() {
        let store = BlobStore::new();
        let content = "x".repeat(500_000);
        let r = store.put(content.clone(), "results");

        assert_eq!(r.size, 500_000);
        assert_eq!(r.preview, "x".repeat(80));
        assert_eq!(r.preview, content[..80]);
        let peeked = store.peek(&r.key, DEFAULT_PEEK_CHARS).unwrap();
        assert_eq!(peeked.chars().count(), 200);
        let sliced = store.slice(&r.key, 100, 150).unwrap();
        assert_eq!(sliced.chars().count(), 50);
        assert_eq!(sliced, content[100..150]);
    }

    #[test]
    fn slice_is_lenient() {
        let store = BlobStore::new();
        let r = store.put("abcdef", "text");
        assert_eq!(store.slice(&r.key, 2, 4).unwrap(), "cd");
        assert_eq!(store.slice(&r.key, 4, 100).unwrap(), "ef");
        assert_eq!(store.slice(&r.key, 5, 2).unwrap(), "");
        assert_eq!(store.slice(&r.key, 50, 60).unwrap(), "");
    }

    #[test]
    fn peek_defaults_and_short_content() {
        let store = BlobStore::new();
        let r = store.put("short", "text");
        assert_eq!(store.peek(&r.key, DEFAULT_PEEK_CHARS).unwrap(), "short");
    }

    #[test]
    fn unknown_key_is_not_found() {
        let store = BlobStore::new();
        assert_eq!(store.get("nope_0"), Err(BlobError::NotFound("nope_0".into())));
        assert!(store.peek("nope_0", 5).is_err());
        assert!(store.stats("nope_0").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn stores_are_independent() {
        let a = BlobStore::new();
        let b = BlobStore::new();
        let r = a.put("x", "text");
        assert!(b.get(&r.key).is_err());
        assert_eq!(b.put("y", "text").key, "text_0");
    }
}
