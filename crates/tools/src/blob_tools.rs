//! Agent-callable accessors over the run's blob store.
//!
//! Every read is bounded by its arguments. `blob_get` is capped as well and
//! points the model at `blob_slice` when the payload is larger than the cap.

use async_trait::async_trait;
use procmem_core::error::ToolError;
use procmem_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use std::sync::Arc;

use crate::blob::{BlobStore, DEFAULT_PEEK_CHARS};

/// Maximum characters `blob_get` returns in one call.
pub const BLOB_GET_MAX_CHARS: usize = 4_000;

fn default_peek() -> usize {
    DEFAULT_PEEK_CHARS
}

fn default_dtype() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PutArgs {
    content: String,
    #[serde(default = "default_dtype")]
    dtype: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyArgs {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PeekArgs {
    key: String,
    #[serde(default = "default_peek")]
    n: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SliceArgs {
    key: String,
    start: usize,
    end: usize,
}

fn key_schema(extra: serde_json::Value) -> serde_json::Value {
    let mut properties = serde_json::json!({
        "key": { "type": "string", "description": "Blob key from a Ref" }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(extra.clone());
    }
    let mut required = vec!["key".to_string()];
    if let Some(extra) = extra.as_object() {
        required.extend(
            extra
                .iter()
                .filter(|(_, v)| v.get("default").is_none())
                .map(|(k, _)| k.clone()),
        );
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Stores text and returns a handle.
pub struct BlobPutTool {
    store: Arc<BlobStore>,
}

impl BlobPutTool {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BlobPutTool {
    fn name(&self) -> &str {
        "blob_put"
    }

    fn description(&self) -> &str {
        "Store text in the blob store and get back a small handle (Ref) instead of the text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to store" },
                "dtype": {
                    "type": "string",
                    "description": "Content type label",
                    "default": "text"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: PutArgs = parse_arguments(self.name(), arguments)?;
        let handle = self.store.put(args.content, &args.dtype);
        let data = serde_json::to_value(&handle).unwrap_or(serde_json::Value::Null);
        Ok(ToolResult::ok(handle.to_string()).with_data(data))
    }
}

/// Returns a blob's payload up to `BLOB_GET_MAX_CHARS`.
pub struct BlobGetTool {
    store: Arc<BlobStore>,
}

impl BlobGetTool {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BlobGetTool {
    fn name(&self) -> &str {
        "blob_get"
    }

    fn description(&self) -> &str {
        "Read a stored blob. Output is capped; use blob_slice to read large blobs in pieces."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        key_schema(serde_json::json!({}))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: KeyArgs = parse_arguments(self.name(), arguments)?;
        let stats = match self.store.stats(&args.key) {
            Ok(stats) => stats,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };
        if stats.size <= BLOB_GET_MAX_CHARS {
            return Ok(match self.store.get(&args.key) {
                Ok(content) => ToolResult::ok(content),
                Err(e) => ToolResult::error(e.to_string()),
            });
        }
        Ok(match self.store.peek(&args.key, BLOB_GET_MAX_CHARS) {
            Ok(head) => ToolResult::ok(format!(
                "{head}\n[truncated: showing {BLOB_GET_MAX_CHARS} of {} chars; \
                 use blob_slice with key '{}' to read the rest]",
                stats.size, args.key
            )),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// Returns the first `n` characters of a blob.
pub struct BlobPeekTool {
    store: Arc<BlobStore>,
}

impl BlobPeekTool {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BlobPeekTool {
    fn name(&self) -> &str {
        "blob_peek"
    }

    fn description(&self) -> &str {
        "Show the first n characters of a stored blob (default 200)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        key_schema(serde_json::json!({
            "n": { "type": "integer", "minimum": 0, "default": DEFAULT_PEEK_CHARS }
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: PeekArgs = parse_arguments(self.name(), arguments)?;
        let n = args.n.min(BLOB_GET_MAX_CHARS);
        Ok(match self.store.peek(&args.key, n) {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// Returns characters `start..end` of a blob.
pub struct BlobSliceTool {
    store: Arc<BlobStore>,
}

impl BlobSliceTool {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BlobSliceTool {
    fn name(&self) -> &str {
        "blob_slice"
    }

    fn description(&self) -> &str {
        "Read characters [start, end) of a stored blob. Out-of-range bounds are clamped."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        key_schema(serde_json::json!({
            "start": { "type": "integer", "minimum": 0 },
            "end": { "type": "integer", "minimum": 0 }
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SliceArgs = parse_arguments(self.name(), arguments)?;
        let end = args.end.min(args.start.saturating_add(BLOB_GET_MAX_CHARS));
        Ok(match self.store.slice(&args.key, args.start, end) {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}

/// Reports size and line count.
pub struct BlobStatsTool {
    store: Arc<BlobStore>,
}

impl BlobStatsTool {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BlobStatsTool {
    fn name(&self) -> &str {
        "blob_stats"
    }

    fn description(&self) -> &str {
        "Report the size in characters and the line count of a stored blob."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        key_schema(serde_json::json!({}))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: KeyArgs = parse_arguments(self.name(), arguments)?;
        Ok(match self.store.stats(&args.key) {
            Ok(stats) => {
                let data = serde_json::to_value(stats).unwrap_or(serde_json::Value::Null);
                ToolResult::ok(format!("size={} lines={}", stats.size, stats.line_count))
                    .with_data(data)
            }
            Err(e) => ToolResult::error(e.to_string()),
        })
    }
}
