//! Blob store and the agent-callable tool surface for procmem runs.
//!
//! Each run builds its own registry over its own `BlobStore`. Blob tools and
//! `run_query` are always available; the memory tools are registered only
//! when the run retrieves memory through tools instead of context injection.

pub mod blob;
pub mod blob_tools;
pub mod memory_get;
pub mod memory_search;
pub mod run_query;

use procmem_core::memory::{CurriculumScope, MemoryStore};
use procmem_core::query::QueryEngine;
use procmem_core::tool::ToolRegistry;
use std::sync::Arc;

pub use blob::{BlobStats, BlobStore};
pub use memory_get::render_item;

/// Memory access granted to a tool-mediated run.
#[derive(Clone)]
pub struct MemoryAccess {
    pub store: Arc<dyn MemoryStore>,
    pub search_k: usize,
    pub max_get: usize,
    pub curriculum: Option<CurriculumScope>,
}

/// Build the tool registry for one run.
pub fn run_registry(
    blobs: Arc<BlobStore>,
    engine: Option<Arc<dyn QueryEngine>>,
    memory: Option<MemoryAccess>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(blob_tools::BlobPutTool::new(blobs.clone())));
    registry.register(Box::new(blob_tools::BlobGetTool::new(blobs.clone())));
    registry.register(Box::new(blob_tools::BlobPeekTool::new(blobs.clone())));
    registry.register(Box::new(blob_tools::BlobSliceTool::new(blobs.clone())));
    registry.register(Box::new(blob_tools::BlobStatsTool::new(blobs.clone())));

    if let Some(engine) = engine {
        registry.register(Box::new(run_query::RunQueryTool::new(engine, blobs)));
    }

    if let Some(memory) = memory {
        let mut search =
            memory_search::MemorySearchTool::new(memory.store.clone(), memory.search_k);
        if let Some(scope) = memory.curriculum {
            search = search.with_curriculum(scope);
        }
        registry.register(Box::new(search));
        registry.register(Box::new(memory_get::MemoryGetTool::new(memory.store, memory.max_get)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use procmem_core::tool::ToolCall;
    use procmem_memory::InMemoryStore;

    #[test]
    fn auto_inject_registry_has_no_memory_tools() {
        let registry = run_registry(Arc::new(BlobStore::new()), None, None);
        assert_eq!(
            registry.names(),
            vec!["blob_get", "blob_peek", "blob_put", "blob_slice", "blob_stats"]
        );
    }

    #[test]
    fn tool_mediated_registry_adds_memory_tools() {
        let memory = MemoryAccess {
            store: Arc::new(InMemoryStore::new()),
            search_k: 5,
            max_get: 3,
            curriculum: None,
        };
        let registry = run_registry(Arc::new(BlobStore::new()), None, Some(memory));
        assert!(registry.get("memory_search").is_some());
        assert!(registry.get("memory_get").is_some());
        assert_eq!(registry.len(), 7);
    }

    #[tokio::test]
    async fn registry_routes_calls_to_the_run_store() {
        let blobs = Arc::new(BlobStore::new());
        let registry = run_registry(blobs.clone(), None, None);
        let call = ToolCall {
            id: "call_1".into(),
            name: "blob_put".into(),
            arguments: serde_json::json!({"content": "payload"}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.call_id, "call_1");
        assert_eq!(blobs.len(), 1);
    }
}
