//! `procmem context build`: assemble the layered context for a task.

use procmem_config::AppConfig;
use procmem_context::{ContextBuilder, DomainModel};
use std::path::Path;
use std::sync::Arc;

use super::open_store;

pub fn load_domain_model(path: &Path) -> Result<DomainModel, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read domain model {}: {e}", path.display()))?;
    let model = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid domain model {}: {e}", path.display()))?;
    Ok(model)
}

pub async fn build(
    config: &AppConfig,
    task: &str,
    domain_model: &Path,
    guide: Option<&Path>,
    disable: &[String],
    show_stats: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = load_domain_model(domain_model)?;

    let mut context_config = config.context.clone();
    for layer in disable {
        if !context_config.set_enabled(layer, false) {
            return Err(format!(
                "unknown layer '{layer}' (expected orientation, constraints, memory or guide)"
            )
            .into());
        }
    }

    let mut builder = ContextBuilder::new(context_config)
        .with_memory(Arc::new(open_store(config)?), config.memory.clone());
    if let Some(path) = guide {
        builder = builder.with_guide(std::fs::read_to_string(path)?);
    }

    let assembled = builder.build(task, &model).await;
    println!("{}", assembled.text);

    if show_stats {
        eprintln!("{}", serde_json::to_string_pretty(&assembled.layers)?);
    } else {
        eprintln!(
            "── {} chars, {} procedures injected",
            assembled.chars(),
            assembled.memory_ids.len()
        );
    }
    Ok(())
}
