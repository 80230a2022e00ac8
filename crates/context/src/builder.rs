//! Budgeted assembly of the four layers.
//!
//! Layers are concatenated in a fixed order, separated by one blank line.
//! The separator is charged to the layer that follows it, so the output never
//! exceeds the sum of the enabled budgets. Identical inputs and store state
//! give identical output.

use procmem_config::{ContextConfig, LayerConfig, MemoryConfig, RetrievalMode};
use procmem_core::memory::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::DomainModel;
use crate::layers::{self, LayerOutput};

const SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

/// The four layers, in assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Orientation,
    Constraints,
    Memory,
    Guide,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Orientation,
        Layer::Constraints,
        Layer::Memory,
        Layer::Guide,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Orientation => "orientation",
            Self::Constraints => "constraints",
            Self::Memory => "memory",
            Self::Guide => "guide",
        }
    }
}

/// Per-layer accounting for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer: Layer,
    pub enabled: bool,
    /// Configured budget in characters.
    pub budget: usize,
    /// Characters the layer contributed, separator included.
    pub chars: usize,
    pub items_included: usize,
    pub items_total: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub layers: Vec<LayerStats>,
    /// Memory items injected into the text, in order.
    pub memory_ids: Vec<String>,
}

impl AssembledContext {
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

pub struct ContextBuilder {
    config: ContextConfig,
    memory: Option<Arc<dyn MemoryStore>>,
    memory_config: MemoryConfig,
    guide: Option<String>,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            memory: None,
            memory_config: MemoryConfig::default(),
            guide: None,
        }
    }

    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>, config: MemoryConfig) -> Self {
        self.memory = Some(store);
        self.memory_config = config;
        self
    }

    /// Reference document compressed into the guide layer.
    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = Some(guide.into());
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn layer_config(&self, layer: Layer) -> LayerConfig {
        match layer {
            Layer::Orientation => self.config.orientation,
            Layer::Constraints => self.config.constraints,
            Layer::Memory => self.config.memory,
            Layer::Guide => self.config.guide,
        }
    }

    async fn render_memory(
        &self,
        task: &str,
        model: &DomainModel,
        budget: usize,
    ) -> (LayerOutput, Vec<String>) {
        let Some(store) = &self.memory else {
            return (LayerOutput::empty(0), Vec::new());
        };
        match self.config.retrieval_mode {
            RetrievalMode::ToolMediated => {
                (layers::memory::render_hint(self.memory_config.max_get, budget), Vec::new())
            }
            RetrievalMode::AutoInject => {
                let request = layers::memory::MemoryRequest {
                    task,
                    domain: (!model.name.is_empty()).then_some(model.name.as_str()),
                    search_k: self.memory_config.search_k,
                    max_items: self.memory_config.max_get,
                    curriculum: self.memory_config.curriculum,
                };
                layers::memory::render(store.as_ref(), &request, budget).await
            }
        }
    }

    /// Assemble the context for `task` over `model`.
    pub async fn build(&self, task: &str, model: &DomainModel) -> AssembledContext {
        let mut sections: Vec<String> = Vec::new();
        let mut stats = Vec::with_capacity(Layer::ALL.len());
        let mut memory_ids = Vec::new();

        for layer in Layer::ALL {
            let cfg = self.layer_config(layer);
            if !cfg.enabled || cfg.budget <= SEPARATOR_CHARS {
                stats.push(LayerStats {
                    layer,
                    enabled: cfg.enabled,
                    budget: cfg.budget,
                    chars: 0,
                    items_included: 0,
                    items_total: 0,
                    truncated: false,
                });
                continue;
            }

            let body_budget = cfg.budget - SEPARATOR_CHARS;
            let output = match layer {
                Layer::Orientation => layers::orientation::render(model, body_budget),
                Layer::Constraints => layers::constraints::render(model, body_budget),
                Layer::Memory => {
                    let (output, ids) = self.render_memory(task, model, body_budget).await;
                    memory_ids = ids;
                    output
                }
                Layer::Guide => match &self.guide {
                    Some(guide) => layers::guide::render(guide, body_budget),
                    None => LayerOutput::empty(0),
                },
            };

            let mut chars = output.text.chars().count();
            if chars > 0 {
                if !sections.is_empty() {
                    chars += SEPARATOR_CHARS;
                }
                sections.push(output.text);
            }
            stats.push(LayerStats {
                layer,
                enabled: true,
                budget: cfg.budget,
                chars,
                items_included: output.items_included,
                items_total: output.items_total,
                truncated: output.truncated,
            });
        }

        let text = sections.join(SEPARATOR);
        debug!(
            chars = text.chars().count(),
            budget = self.config.total_budget(),
            memory_items = memory_ids.len(),
            "Context assembled"
        );
        AssembledContext {
            text,
            layers: stats,
            memory_ids,
        }
    }
}
