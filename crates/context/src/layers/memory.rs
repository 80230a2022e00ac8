//! L2: procedures from memory, retrieved in two phases.
//!
//! `search` ranks metadata, then at most `max_items` ids are materialized
//! with `get`. Blocks are included whole; only a lone first block that
//! overflows the budget is cut.

use procmem_core::memory::{CurriculumScope, MemoryItem, MemoryQuery, MemoryStore};
use tracing::{debug, warn};

use super::LayerOutput;
use crate::truncate::truncate;

const HEADER: &str = "## Procedures from memory";

/// Retrieval parameters for one build.
#[derive(Debug, Clone)]
pub struct MemoryRequest<'a> {
    pub task: &'a str,
    pub domain: Option<&'a str>,
    pub search_k: usize,
    pub max_items: usize,
    pub curriculum: bool,
}

fn block(item: &MemoryItem) -> String {
    format!("### {}\n{}\n\n{}", item.title, item.description, item.content.trim_end())
}

/// Fetch and render. Returns the layer and the ids of included blocks.
pub async fn render(
    store: &dyn MemoryStore,
    request: &MemoryRequest<'_>,
    budget: usize,
) -> (LayerOutput, Vec<String>) {
    let mut query = MemoryQuery::new(request.task, request.search_k);
    if request.curriculum {
        query = query.with_curriculum(CurriculumScope {
            domain: request.domain.map(str::to_string),
            level: None,
        });
    }

    let hits = match store.search(&query).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(
                store = store.name(),
                error = %e,
                "Memory search failed, memory layer left empty"
            );
            return (LayerOutput::empty(0), Vec::new());
        }
    };
    if hits.is_empty() {
        debug!("No procedures matched the task");
        return (LayerOutput::empty(0), Vec::new());
    }

    let ids: Vec<String> = hits
        .into_iter()
        .take(request.max_items)
        .map(|h| h.id)
        .collect();
    let items = match store.get(&ids, request.max_items).await {
        Ok(items) => items,
        Err(e) => {
            warn!(store = store.name(), error = %e, "Memory get failed, memory layer left empty");
            return (LayerOutput::empty(ids.len()), Vec::new());
        }
    };

    let total = items.len();
    let mut text = HEADER.to_string();
    let mut used = HEADER.chars().count();
    let mut included = Vec::new();
    let mut cut = false;

    for item in &items {
        let body = block(item);
        let cost = 2 + body.chars().count();
        if used + cost <= budget {
            text.push_str("\n\n");
            text.push_str(&body);
            used += cost;
            included.push(item.id.clone());
        } else if included.is_empty() && used + 2 < budget {
            text.push_str("\n\n");
            text.push_str(&truncate(&body, budget - used - 2));
            included.push(item.id.clone());
            cut = true;
            break;
        } else {
            break;
        }
    }

    if included.is_empty() {
        return (LayerOutput::empty(total), Vec::new());
    }
    let output = LayerOutput {
        text,
        items_included: included.len(),
        items_total: total,
        truncated: cut || included.len() < total,
    };
    (output, included)
}

/// The layer text for runs where the agent retrieves through tools.
pub fn render_hint(max_get: usize, budget: usize) -> LayerOutput {
    let hint = format!(
        "{HEADER}\nReusable procedures may exist for this task. Call memory_search with a \
         short description of what you are trying to do, then memory_get with at most \
         {max_get} of the returned ids."
    );
    let text = truncate(&hint, budget);
    LayerOutput {
        items_included: usize::from(!text.is_empty()),
        items_total: 1,
        truncated: text.len() < hint.len(),
        text,
    }
}
