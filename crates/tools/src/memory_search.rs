//! Memory search tool: phase one of two-phase retrieval.
//!
//! Returns ranked metadata only (id, title, description, source type,
//! level, score). The agent picks ids from this list and fetches content
//! with `memory_get`.

use async_trait::async_trait;
use procmem_core::error::ToolError;
use procmem_core::memory::{CurriculumScope, MemoryQuery, MemoryStore};
use procmem_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use std::sync::Arc;

/// Hard ceiling on `k` regardless of what the agent asks for.
const MAX_K: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    tags: Vec<String>,
}

/// A tool that searches the procedural memory store.
pub struct MemorySearchTool {
    store: Arc<dyn MemoryStore>,
    default_k: usize,
    curriculum: Option<CurriculumScope>,
}

impl MemorySearchTool {
    pub fn new(store: Arc<dyn MemoryStore>, default_k: usize) -> Self {
        Self {
            store,
            default_k: default_k.clamp(1, MAX_K),
            curriculum: None,
        }
    }

    /// Rank with curriculum tiers for this run's domain.
    pub fn with_curriculum(mut self, scope: CurriculumScope) -> Self {
        self.curriculum = Some(scope);
        self
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search procedural memory for reusable procedures. Returns ids, titles and \
         descriptions only; fetch the few you need with memory_get."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What you are trying to do"
                },
                "k": {
                    "type": "integer",
                    "description": "Maximum number of results",
                    "default": self.default_k,
                    "maximum": MAX_K
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional tags to filter by"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SearchArgs = parse_arguments(self.name(), arguments)?;
        let k = args.k.unwrap_or(self.default_k).min(MAX_K);

        let mut query = MemoryQuery::new(args.query.clone(), k).with_tags(args.tags);
        if let Some(scope) = &self.curriculum {
            query = query.with_curriculum(scope.clone());
        }

        match self.store.search(&query).await {
            Ok(hits) if hits.is_empty() => Ok(ToolResult::ok(format!(
                "No procedures found matching '{}'.",
                args.query
            ))),
            Ok(hits) => {
                let output = hits
                    .iter()
                    .map(|h| {
                        format!(
                            "[{}] {} ({}): {}",
                            h.id, h.title, h.source_type, h.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let data = serde_json::to_value(&hits).unwrap_or(serde_json::Value::Null);
                Ok(ToolResult::ok(output).with_data(data))
            }
            Err(e) => Ok(ToolResult::error(format!("Memory search failed: {e}"))),
        }
    }
}
