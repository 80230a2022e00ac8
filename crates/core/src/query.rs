//! QueryEngine trait: an opaque `query -> rows` function.
//!
//! No dialect logic lives in this workspace. Engines for SPARQL endpoints,
//! local graph files or test fixtures implement this one method.

use async_trait::async_trait;

use crate::error::QueryError;

/// One result row, as a JSON object keyed by variable name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Engine name for logs (e.g., "fixture", "sparql").
    fn name(&self) -> &str;

    /// Execute a query string and return its rows.
    async fn execute(&self, query: &str) -> Result<Vec<Row>, QueryError>;
}
