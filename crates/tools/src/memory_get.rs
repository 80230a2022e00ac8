//! Memory get tool: phase two of two-phase retrieval.

use async_trait::async_trait;
use procmem_core::error::ToolError;
use procmem_core::memory::{MemoryItem, MemoryStore};
use procmem_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetArgs {
    ids: Vec<String>,
}

/// Fetches full procedures by id, at most `max_n` per call.
pub struct MemoryGetTool {
    store: Arc<dyn MemoryStore>,
    max_n: usize,
}

impl MemoryGetTool {
    pub fn new(store: Arc<dyn MemoryStore>, max_n: usize) -> Self {
        Self { store, max_n }
    }
}

/// Markdown block for one procedure, as `memory_get` and `procmem memory show` print it.
pub fn render_item(item: &MemoryItem) -> String {
    format!(
        "### {}\n_{}_ [{}]\n{}",
        item.title, item.description, item.source_type, item.content
    )
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Fetch the full content of procedures by id (ids come from memory_search). \
         Only a few may be fetched per call."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "maxItems": self.max_n,
                    "description": "Ids returned by memory_search"
                }
            },
            "required": ["ids"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: GetArgs = parse_arguments(self.name(), arguments)?;
        match self.store.get(&args.ids, self.max_n).await {
            Ok(items) => {
                let output = items
                    .iter()
                    .map(render_item)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Ok(ToolResult::ok(output))
            }
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}
