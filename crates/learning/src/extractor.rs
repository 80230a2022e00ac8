//! Extraction: turning a judged trajectory into memory items.

use async_trait::async_trait;
use procmem_core::error::LearningError;
use procmem_core::memory::{MemoryItem, Provenance, SourceType};
use procmem_core::provider::{Provider, ProviderRequest};
use procmem_core::trajectory::{Judgment, Trajectory, Verdict};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::prompts;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        trajectory: &Trajectory,
        judgment: &Judgment,
    ) -> Result<Vec<MemoryItem>, LearningError>;
}

/// One item as the model writes it.
#[derive(Debug, Deserialize)]
pub(crate) struct DraftItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parse a JSON array of drafts. Malformed output yields nothing.
pub(crate) fn parse_drafts(text: &str) -> Vec<DraftItem> {
    let Some(json) = prompts::extract_json(text) else {
        debug!("Extraction reply contained no JSON");
        return Vec::new();
    };
    // A single object is accepted as a one-item list.
    let drafts = serde_json::from_str::<Vec<DraftItem>>(json)
        .or_else(|_| serde_json::from_str::<DraftItem>(json).map(|d| vec![d]));
    match drafts {
        Ok(drafts) => drafts
            .into_iter()
            .filter(|d| !d.title.trim().is_empty() && !d.content.trim().is_empty())
            .collect(),
        Err(e) => {
            debug!(error = %e, "Extraction reply was malformed");
            Vec::new()
        }
    }
}

pub struct LlmExtractor {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_items: usize,
    learn_from_failures: bool,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: 2048,
            max_items: 3,
            learn_from_failures: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn learn_from_failures(mut self, enabled: bool) -> Self {
        self.learn_from_failures = enabled;
        self
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(
        &self,
        trajectory: &Trajectory,
        judgment: &Judgment,
    ) -> Result<Vec<MemoryItem>, LearningError> {
        let source_type = match judgment.verdict {
            Verdict::Success => SourceType::Success,
            Verdict::Failure if self.learn_from_failures => SourceType::Failure,
            Verdict::Failure | Verdict::Indeterminate => return Ok(Vec::new()),
        };

        let request = ProviderRequest::prompt(
            self.model.clone(),
            prompts::extract_prompt(trajectory, judgment, self.max_items),
            self.temperature,
        )
        .with_max_tokens(self.max_tokens);
        let response = self.provider.complete(request).await?;

        let level = procmem_memory::classify(&trajectory.task);
        let items: Vec<MemoryItem> = parse_drafts(&response.message.content)
            .into_iter()
            .take(self.max_items)
            .map(|draft| {
                let provenance = Provenance {
                    task_id: Some(trajectory.task_id.clone()),
                    judge_reason: Some(judgment.reason.clone()),
                    ..Provenance::new("extraction")
                };
                let mut item =
                    MemoryItem::new(draft.title, draft.description, draft.content, source_type)
                        .with_tags(draft.tags)
                        .with_level(level)
                        .with_provenance(provenance);
                if let Some(domain) = &trajectory.domain {
                    item = item.with_domain(domain.clone());
                }
                item
            })
            .collect();

        if items.is_empty() {
            debug!(task_id = %trajectory.task_id, "Extraction produced no items");
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use procmem_core::trajectory::Step;

    fn trajectory() -> Trajectory {
        Trajectory::new(
            "t1",
            "How many proteins are there per organism?",
            vec![Step::new("group by organism", "SELECT ...", "rows")],
        )
        .with_answer("see table")
        .with_domain("uniprot")
    }

    const TWO_ITEMS: &str = r#"```json
[
  {"title": "Group counts by organism", "description": "Per-organism totals",
   "content": "1. GROUP BY organism\n2. COUNT(DISTINCT ?p)", "tags": ["aggregate"]},
  {"title": "", "description": "dropped", "content": "no title", "tags": []}
]
```"#;

    #[tokio::test]
    async fn success_yields_success_items_with_provenance() {
        let provider = Arc::new(ScriptedProvider::new(vec![TWO_ITEMS]));
        let extractor = LlmExtractor::new(provider, "m");
        let items = extractor
            .extract(&trajectory(), &Judgment::success("correct", 0.9))
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.source_type, SourceType::Success);
        assert_eq!(item.domain.as_deref(), Some("uniprot"));
        assert_eq!(item.curriculum_level.map(|l| l.get()), Some(3));
        assert_eq!(item.provenance.task_id.as_deref(), Some("t1"));
        assert!(item.tags.contains("aggregate"));
        assert!(item.has_valid_id());
    }

    #[tokio::test]
    async fn failure_yields_failure_items_when_enabled() {
        let provider = Arc::new(ScriptedProvider::new(vec![TWO_ITEMS]));
        let items = LlmExtractor::new(provider, "m")
            .extract(&trajectory(), &Judgment::failure("wrong", 0.9))
            .await
            .unwrap();
        assert_eq!(items[0].source_type, SourceType::Failure);
    }

    #[tokio::test]
    async fn failure_is_skipped_when_disabled() {
        let provider = Arc::new(ScriptedProvider::new(vec![TWO_ITEMS]));
        let items = LlmExtractor::new(provider.clone(), "m")
            .learn_from_failures(false)
            .extract(&trajectory(), &Judgment::failure("wrong", 0.9))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn indeterminate_is_never_extracted() {
        let provider = Arc::new(ScriptedProvider::new(vec![TWO_ITEMS]));
        let items = LlmExtractor::new(provider.clone(), "m")
            .extract(&trajectory(), &Judgment::indeterminate("?"))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_output_is_empty_not_error() {
        let provider = Arc::new(ScriptedProvider::new(vec!["I could not find anything useful."]));
        let items = LlmExtractor::new(provider, "m")
            .extract(&trajectory(), &Judgment::success("ok", 0.9))
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn single_object_is_accepted() {
        let drafts = parse_drafts(r#"{"title": "t", "description": "d", "content": "c"}"#);
        assert_eq!(drafts.len(), 1);
    }
}
