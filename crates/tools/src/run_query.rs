//! Query tool: runs a query and parks the rows behind a handle.

use async_trait::async_trait;
use procmem_core::error::ToolError;
use procmem_core::query::QueryEngine;
use procmem_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::blob::BlobStore;

fn default_dtype() -> String {
    "results".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryArgs {
    query: String,
    #[serde(default = "default_dtype")]
    dtype: String,
}

/// Executes through a `QueryEngine`; the model only sees the resulting `Ref`.
pub struct RunQueryTool {
    engine: Arc<dyn QueryEngine>,
    blobs: Arc<BlobStore>,
}

impl RunQueryTool {
    pub fn new(engine: Arc<dyn QueryEngine>, blobs: Arc<BlobStore>) -> Self {
        Self { engine, blobs }
    }
}

#[async_trait]
impl Tool for RunQueryTool {
    fn name(&self) -> &str {
        "run_query"
    }

    fn description(&self) -> &str {
        "Run a query against the knowledge source. Rows are stored as a blob; \
         inspect them with blob_peek, blob_slice and blob_stats."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Query text" },
                "dtype": { "type": "string", "default": "results" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: QueryArgs = parse_arguments(self.name(), arguments)?;

        let rows = match self.engine.execute(&args.query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Query failed");
                return Ok(ToolResult::error(format!("Query failed: {e}")));
            }
        };

        let body = serde_json::to_string(&rows).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let handle = self.blobs.put(body, &args.dtype);
        debug!(key = %handle.key, rows = rows.len(), "Query rows stored");

        Ok(
            ToolResult::ok(format!("{} rows -> {handle}", rows.len())).with_data(serde_json::json!({
                "ref": handle,
                "row_count": rows.len(),
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procmem_core::error::QueryError;
    use procmem_core::query::Row;

    struct FixedEngine {
        rows: usize,
    }

    #[async_trait]
    impl QueryEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn execute(&self, query: &str) -> Result<Vec<Row>, QueryError> {
            if query.contains("BROKEN") {
                return Err(QueryError::Execution("syntax error".into()));
            }
            Ok((0..self.rows)
                .map(|i| {
                    let mut row = Row::new();
                    row.insert("s".into(), serde_json::json!(format!("http://ex.org/item/{i}")));
                    row
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn rows_go_to_the_blob_store() {
        let blobs = Arc::new(BlobStore::new());
        let tool = RunQueryTool::new(Arc::new(FixedEngine { rows: 5_000 }), blobs.clone());
        let result = tool
            .execute(serde_json::json!({"query": "SELECT ?s WHERE { ?s ?p ?o }"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("5000 rows -> <Ref results_0"));
        assert!(result.output.len() < 250);
        let stored = blobs.get("results_0").unwrap();
        assert!(stored.contains("http://ex.org/item/4999"));
    }

    #[tokio::test]
    async fn engine_error_is_reported_to_the_agent() {
        let blobs = Arc::new(BlobStore::new());
        let tool = RunQueryTool::new(Arc::new(FixedEngine { rows: 1 }), blobs.clone());
        let result = tool
            .execute(serde_json::json!({"query": "BROKEN"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("syntax error"));
        assert!(blobs.is_empty());
    }
}
