//! Cross-trajectory meta-analysis.
//!
//! A consolidator looks at several judged runs at once and writes lessons
//! that hold across them. Single runs are rejected: there is nothing to
//! compare.

use async_trait::async_trait;
use procmem_core::error::LearningError;
use procmem_core::memory::{MemoryItem, Provenance, SourceType};
use procmem_core::provider::{Provider, ProviderRequest};
use procmem_core::trajectory::{Judgment, Trajectory, Verdict};
use std::sync::Arc;
use tracing::debug;

use crate::extractor::parse_drafts;
use crate::prompts;

/// A trajectory with its verdict and the batch iteration it came from.
#[derive(Debug, Clone)]
pub struct JudgedRun {
    pub trajectory: Trajectory,
    pub judgment: Judgment,
    pub iteration: u32,
}

#[async_trait]
pub trait Consolidator: Send + Sync {
    async fn consolidate(&self, batch: &[JudgedRun]) -> Result<Vec<MemoryItem>, LearningError>;
}

/// Batch statistics stamped on every meta-analysis item.
pub(crate) fn batch_provenance(batch: &[JudgedRun]) -> Provenance {
    let judged: Vec<&JudgedRun> = batch
        .iter()
        .filter(|r| r.judgment.verdict != Verdict::Indeterminate)
        .collect();
    let pass_rate = (!judged.is_empty()).then(|| {
        judged.iter().filter(|r| r.judgment.is_success()).count() as f64 / judged.len() as f64
    });
    let low = batch.iter().map(|r| r.iteration).min();
    let high = batch.iter().map(|r| r.iteration).max();
    Provenance {
        trajectories_analyzed: Some(batch.len()),
        iteration_range: low.zip(high),
        pass_rate,
        ..Provenance::new("consolidation")
    }
}

/// The domain shared by every run, if there is exactly one.
fn shared_domain(batch: &[JudgedRun]) -> Option<String> {
    let first = batch.first()?.trajectory.domain.as_ref()?;
    batch
        .iter()
        .all(|r| r.trajectory.domain.as_ref() == Some(first))
        .then(|| first.clone())
}

pub struct LlmConsolidator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    min_batch: usize,
    max_items: usize,
}

impl LlmConsolidator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: 2048,
            min_batch: 2,
            max_items: 5,
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

    /// Values below 2 are raised to 2.
    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.min_batch = min_batch.max(2);
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }
}

#[async_trait]
impl Consolidator for LlmConsolidator {
    async fn consolidate(&self, batch: &[JudgedRun]) -> Result<Vec<MemoryItem>, LearningError> {
        if batch.len() < self.min_batch {
            return Err(LearningError::Consolidation(format!(
                "need at least {} judged runs, got {}",
                self.min_batch,
                batch.len()
            )));
        }

        let runs: Vec<(&Trajectory, &Judgment)> =
            batch.iter().map(|r| (&r.trajectory, &r.judgment)).collect();
        let request = ProviderRequest::prompt(
            self.model.clone(),
            prompts::consolidate_prompt(&runs, self.max_items),
            self.temperature,
        )
        .with_max_tokens(self.max_tokens);
        let response = self.provider.complete(request).await?;

        let provenance = batch_provenance(batch);
        let domain = shared_domain(batch);
        let items: Vec<MemoryItem> = parse_drafts(&response.message.content)
            .into_iter()
            .take(self.max_items)
            .map(|draft| {
                let mut item = MemoryItem::new(
                    draft.title,
                    draft.description,
                    draft.content,
                    SourceType::MetaAnalysis,
                )
                .with_tags(draft.tags)
                .with_provenance(provenance.clone());
                if let Some(domain) = &domain {
                    item = item.with_domain(domain.clone());
                }
                item
            })
            .collect();

        debug!(runs = batch.len(), items = items.len(), "Consolidation finished");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use procmem_core::trajectory::Step;

    fn run(id: &str, domain: &str, judgment: Judgment, iteration: u32) -> JudgedRun {
        JudgedRun {
            trajectory: Trajectory::new(id, format!("task {id}"), vec![Step::new("r", "c", "o")])
                .with_answer("a")
                .with_domain(domain),
            judgment,
            iteration,
        }
    }

    const REPLY: &str = r#"[{"title": "Check cardinality first", "description": "d",
        "content": "Inspect functional properties before joining", "tags": ["join"]}]"#;

    #[tokio::test]
    async fn single_run_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![REPLY]));
        let consolidator = LlmConsolidator::new(provider.clone(), "m");
        let err = consolidator
            .consolidate(&[run("a", "x", Judgment::success("ok", 0.9), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, LearningError::Consolidation(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn items_carry_batch_provenance() {
        let provider = Arc::new(ScriptedProvider::new(vec![REPLY]));
        let batch = vec![
            run("a", "uniprot", Judgment::success("ok", 0.9), 3),
            run("b", "uniprot", Judgment::failure("wrong", 0.8), 1),
            run("c", "uniprot", Judgment::success("ok", 0.7), 5),
            run("d", "uniprot", Judgment::success("ok", 0.9), 2),
        ];
        let items = LlmConsolidator::new(provider, "m")
            .consolidate(&batch)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.source_type, SourceType::MetaAnalysis);
        assert_eq!(item.domain.as_deref(), Some("uniprot"));
        assert_eq!(item.provenance.trajectories_analyzed, Some(4));
        assert_eq!(item.provenance.iteration_range, Some((1, 5)));
        assert_eq!(item.provenance.pass_rate, Some(0.75));
    }

    #[tokio::test]
    async fn mixed_domains_leave_domain_unset() {
        let provider = Arc::new(ScriptedProvider::new(vec![REPLY]));
        let batch = vec![
            run("a", "uniprot", Judgment::success("ok", 0.9), 1),
            run("b", "wikidata", Judgment::success("ok", 0.9), 1),
        ];
        let items = LlmConsolidator::new(provider, "m")
            .consolidate(&batch)
            .await
            .unwrap();
        assert!(items[0].domain.is_none());
    }

    #[test]
    fn pass_rate_ignores_indeterminate() {
        let batch = vec![
            run("a", "x", Judgment::success("ok", 0.9), 1),
            run("b", "x", Judgment::indeterminate("?"), 1),
        ];
        assert_eq!(batch_provenance(&batch).pass_rate, Some(1.0));
    }
}
