//! Handles: small fixed-size references to arbitrarily large content.
//!
//! A `Ref` is what the model sees instead of the payload. Its `Display`
//! form is bounded no matter how large the underlying blob is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading characters kept in a handle's preview.
pub const PREVIEW_CHARS: usize = 80;

/// Maximum characters of the dtype kept in a key or a handle.
pub const MAX_DTYPE_CHARS: usize = 24;

/// A reference to content held in a blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Store key, `{dtype}_{n}`.
    pub key: String,
    /// Caller-supplied content type (e.g. "results", "graph").
    pub dtype: String,
    /// Content length in characters.
    pub size: usize,
    /// The first `PREVIEW_CHARS` characters of the content.
    pub preview: String,
}

impl Ref {
    pub fn new(key: impl Into<String>, dtype: &str, content: &str) -> Self {
        Self {
            key: key.into(),
            dtype: dtype.chars().take(MAX_DTYPE_CHARS).collect(),
            size: content.chars().count(),
            preview: content.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control characters are flattened so the rendering stays one line
        // and no escape sequence can grow it.
        let preview: String = self
            .preview
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        write!(
            f,
            "<Ref {} dtype={} size={} preview=\"{}\">",
            self.key, self.dtype, self.size, preview
        )
    }
}
