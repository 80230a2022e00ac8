//! The closed loop: judge a finished run, extract procedures, store them.
//!
//! ```text
//! RETRIEVED -> EXECUTED -> JUDGED -> EXTRACTED -> STORED
//!                              \-> DISCARDED
//! ```
//!
//! A non-convergent run is discarded before judging. An error while learning
//! from one trajectory never stops a batch; it is recorded and the batch
//! moves on.

use chrono::Utc;
use procmem_config::LearningConfig;
use procmem_core::error::LearningError;
use procmem_core::event::{DomainEvent, EventBus};
use procmem_core::memory::MemoryStore;
use procmem_core::trajectory::{Judgment, Trajectory, Verdict};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

use crate::consolidator::{Consolidator, JudgedRun};
use crate::extractor::Extractor;
use crate::judge::Judge;

/// Where a trajectory's learning step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieved,
    Executed,
    Judged,
    Extracted,
    Stored,
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningOutcome {
    pub task_id: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgment: Option<Judgment>,
    /// Ids written to the store, in extraction order.
    pub stored_ids: Vec<String>,
    /// Why the trajectory was discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LearningOutcome {
    fn discarded(task_id: &str, judgment: Option<Judgment>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            stage: Stage::Discarded,
            judgment,
            stored_ids: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.judgment.as_ref().map(|j| j.verdict)
    }
}

/// Per-trajectory result inside a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrajectoryStatus {
    Learned(LearningOutcome),
    Error { task_id: String, error: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub statuses: Vec<TrajectoryStatus>,
    /// Ids written by consolidation.
    pub consolidated_ids: Vec<String>,
    pub consolidation_errors: Vec<String>,
}

impl BatchReport {
    fn count_verdict(&self, verdict: Verdict) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, TrajectoryStatus::Learned(o) if o.verdict() == Some(verdict)))
            .count()
    }

    pub fn successes(&self) -> usize {
        self.count_verdict(Verdict::Success)
    }

    pub fn failures(&self) -> usize {
        self.count_verdict(Verdict::Failure)
    }

    pub fn indeterminate(&self) -> usize {
        self.count_verdict(Verdict::Indeterminate)
    }

    /// Discarded before judging.
    pub fn non_convergent(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, TrajectoryStatus::Learned(o) if o.judgment.is_none()))
            .count()
    }

    pub fn errors(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| matches!(s, TrajectoryStatus::Error { .. }))
            .count()
    }

    /// Every id written by the batch, extraction and consolidation alike.
    pub fn stored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .statuses
            .iter()
            .filter_map(|s| match s {
                TrajectoryStatus::Learned(o) => Some(o.stored_ids.iter().cloned()),
                TrajectoryStatus::Error { .. } => None,
            })
            .flatten()
            .collect();
        ids.extend(self.consolidated_ids.iter().cloned());
        ids
    }
}

pub struct ClosedLoop {
    judge: Arc<dyn Judge>,
    extractor: Arc<dyn Extractor>,
    consolidator: Option<Arc<dyn Consolidator>>,
    memory: Arc<dyn MemoryStore>,
    config: LearningConfig,
    events: Option<Arc<EventBus>>,
    iteration: AtomicU32,
}

impl ClosedLoop {
    pub fn new(
        judge: Arc<dyn Judge>,
        extractor: Arc<dyn Extractor>,
        memory: Arc<dyn MemoryStore>,
        config: LearningConfig,
    ) -> Self {
        Self {
            judge,
            extractor,
            consolidator: None,
            memory,
            config,
            events: None,
            iteration: AtomicU32::new(0),
        }
    }

    pub fn with_consolidator(mut self, consolidator: Arc<dyn Consolidator>) -> Self {
        self.consolidator = Some(consolidator);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn discard(&self, outcome: LearningOutcome) -> LearningOutcome {
        let reason = outcome.reason.clone().unwrap_or_default();
        debug!(task_id = %outcome.task_id, reason = %reason, "Trajectory discarded");
        self.publish(DomainEvent::TrajectoryDiscarded {
            task_id: outcome.task_id.clone(),
            reason,
            timestamp: Utc::now(),
        });
        outcome
    }

    /// Credit or blame the memory items that were in the run's context.
    async fn record_outcomes(&self, trajectory: &Trajectory, success: bool) {
        for id in &trajectory.memory_ids {
            if let Err(e) = self.memory.record_outcome(id, success).await {
                warn!(id = %id, error = %e, "Failed to record memory outcome");
            }
        }
    }

    /// Learn from one finished run. `iteration` tags the run for
    /// consolidation provenance.
    pub async fn learn(
        &self,
        trajectory: &Trajectory,
        iteration: u32,
    ) -> Result<LearningOutcome, LearningError> {
        let task_id = trajectory.task_id.as_str();
        debug!(task_id, iteration, steps = trajectory.iterations(), "Learning from trajectory");

        if !trajectory.is_converged() {
            return Ok(self.discard(LearningOutcome::discarded(
                task_id,
                None,
                format!("non-convergent: {:?}", trajectory.termination),
            )));
        }

        let judgment = self.judge.judge(trajectory).await?;
        self.publish(DomainEvent::TrajectoryJudged {
            task_id: task_id.to_string(),
            verdict: judgment.verdict,
            confidence: judgment.confidence,
            timestamp: Utc::now(),
        });

        match judgment.verdict {
            Verdict::Indeterminate => {
                return Ok(self.discard(LearningOutcome::discarded(
                    task_id,
                    Some(judgment),
                    "indeterminate verdict",
                )));
            }
            Verdict::Success => self.record_outcomes(trajectory, true).await,
            Verdict::Failure => self.record_outcomes(trajectory, false).await,
        }

        if judgment.confidence < self.config.min_confidence {
            let reason = format!(
                "confidence {:.2} below {:.2}",
                judgment.confidence, self.config.min_confidence
            );
            return Ok(self.discard(LearningOutcome::discarded(task_id, Some(judgment), reason)));
        }

        if judgment.verdict == Verdict::Failure && !self.config.learn_from_failures {
            return Ok(self.discard(LearningOutcome::discarded(
                task_id,
                Some(judgment),
                "failure learning disabled",
            )));
        }

        let items = self.extractor.extract(trajectory, &judgment).await?;
        if items.is_empty() {
            return Ok(self.discard(LearningOutcome::discarded(
                task_id,
                Some(judgment),
                "nothing extracted",
            )));
        }

        let mut stored_ids = Vec::with_capacity(items.len());
        for item in items {
            stored_ids.push(self.memory.add(item).await?);
        }

        info!(
            task_id,
            verdict = %judgment.verdict,
            stored = stored_ids.len(),
            "Stored procedures from trajectory"
        );
        self.publish(DomainEvent::MemoryStored {
            task_id: task_id.to_string(),
            ids: stored_ids.clone(),
            timestamp: Utc::now(),
        });

        Ok(LearningOutcome {
            task_id: task_id.to_string(),
            stage: Stage::Stored,
            judgment: Some(judgment),
            stored_ids,
            reason: None,
        })
    }

    async fn consolidate(&self, pending: &mut Vec<JudgedRun>, report: &mut BatchReport) {
        let Some(consolidator) = &self.consolidator else {
            pending.clear();
            return;
        };
        if pending.len() < self.config.min_batch {
            return;
        }
        let batch = std::mem::take(pending);
        let result = async {
            let items = consolidator.consolidate(&batch).await?;
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                ids.push(self.memory.add(item).await?);
            }
            Ok::<_, LearningError>(ids)
        }
        .await;

        match result {
            Ok(ids) => {
                info!(runs = batch.len(), stored = ids.len(), "Consolidated batch");
                report.consolidated_ids.extend(ids);
            }
            Err(e) => {
                warn!(runs = batch.len(), error = %e, "Consolidation failed");
                self.publish(DomainEvent::ErrorOccurred {
                    context: "consolidation".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                report.consolidation_errors.push(e.to_string());
            }
        }
    }

    /// Learn from each trajectory in order, then consolidate the judged runs
    /// in windows of `consolidate_every` (or once at the end when it is 0).
    pub async fn learn_batch(&self, trajectories: &[Trajectory]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut pending: Vec<JudgedRun> = Vec::new();

        for trajectory in trajectories {
            let iteration = self.iteration.fetch_add(1, Ordering::Relaxed) + 1;
            match self.learn(trajectory, iteration).await {
                Ok(outcome) => {
                    if let Some(judgment) = outcome
                        .judgment
                        .as_ref()
                        .filter(|j| j.verdict != Verdict::Indeterminate)
                    {
                        pending.push(JudgedRun {
                            trajectory: trajectory.clone(),
                            judgment: judgment.clone(),
                            iteration,
                        });
                    }
                    report.statuses.push(TrajectoryStatus::Learned(outcome));
                }
                Err(e) => {
                    warn!(task_id = %trajectory.task_id, error = %e, "Learning step failed");
                    self.publish(DomainEvent::ErrorOccurred {
                        context: format!("learn:{}", trajectory.task_id),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    report.statuses.push(TrajectoryStatus::Error {
                        task_id: trajectory.task_id.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if self.config.consolidate_every > 0 && pending.len() >= self.config.consolidate_every {
                self.consolidate(&mut pending, &mut report).await;
            }
        }

        self.consolidate(&mut pending, &mut report).await;

        info!(
            trajectories = trajectories.len(),
            successes = report.successes(),
            failures = report.failures(),
            errors = report.errors(),
            stored = report.stored_ids().len(),
            "Batch learning finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use procmem_core::memory::{MemoryItem, SourceType};
    use procmem_core::trajectory::{Step, Termination};
    use procmem_memory::InMemoryStore;
    use std::sync::atomic::AtomicUsize;

    /// Verdict from the answer text: "good" succeeds, "bad" fails,
    /// "boom" errors, anything else is indeterminate.
    struct AnswerJudge;

    #[async_trait]
    impl Judge for AnswerJudge {
        async fn judge(&self, trajectory: &Trajectory) -> Result<Judgment, LearningError> {
            match trajectory.final_answer.as_deref() {
                Some("good") => Ok(Judgment::success("matches", 0.9)),
                Some("bad") => Ok(Judgment::failure("wrong", 0.9)),
                Some("shaky") => Ok(Judgment::success("maybe", 0.1)),
                Some("boom") => Err(LearningError::Judge("judge crashed".into())),
                _ => Ok(Judgment::indeterminate("no idea")),
            }
        }
    }

    /// One item per call, titled after the task.
    #[derive(Default)]
    struct TaskExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for TaskExtractor {
        async fn extract(
            &self,
            trajectory: &Trajectory,
            judgment: &Judgment,
        ) -> Result<Vec<MemoryItem>, LearningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let source = if judgment.is_success() {
                SourceType::Success
            } else {
                SourceType::Failure
            };
            Ok(vec![MemoryItem::new(
                format!("Procedure for {}", trajectory.task),
                "learned",
                format!("steps: {}", trajectory.iterations()),
                source,
            )])
        }
    }

    struct CountingConsolidator {
        batches: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Consolidator for CountingConsolidator {
        async fn consolidate(&self, batch: &[JudgedRun]) -> Result<Vec<MemoryItem>, LearningError> {
            self.batches.lock().unwrap().push(batch.len());
            Ok(vec![MemoryItem::new(
                format!("Lesson over {} runs", batch.len()),
                "meta",
                "compare runs",
                SourceType::MetaAnalysis,
            )])
        }
    }

    fn trajectory(id: &str, answer: &str) -> Trajectory {
        Trajectory::new(id, format!("task {id}"), vec![Step::new("think", "code", "out")])
            .with_answer(answer)
    }

    fn config() -> LearningConfig {
        LearningConfig {
            learn_from_failures: true,
            min_batch: 2,
            consolidate_every: 0,
            min_confidence: 0.5,
        }
    }

    fn closed_loop(memory: Arc<dyn MemoryStore>) -> (ClosedLoop, Arc<TaskExtractor>) {
        let extractor = Arc::new(TaskExtractor::default());
        let lp = ClosedLoop::new(Arc::new(AnswerJudge), extractor.clone(), memory, config());
        (lp, extractor)
    }

    #[tokio::test]
    async fn success_is_extracted_and_stored() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let (lp, _) = closed_loop(memory.clone());
        let outcome = lp.learn(&trajectory("t1", "good"), 1).await.unwrap();

        assert_eq!(outcome.stage, Stage::Stored);
        assert_eq!(outcome.stored_ids.len(), 1);
        assert_eq!(memory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_convergent_is_discarded_without_judging() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let (lp, extractor) = closed_loop(memory.clone());
        let run = trajectory("t1", "boom").with_termination(Termination::MaxIterations);
        let outcome = lp.learn(&run, 1).await.unwrap();

        assert_eq!(outcome.stage, Stage::Discarded);
        assert!(outcome.judgment.is_none());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn indeterminate_and_low_confidence_are_discarded() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let (lp, extractor) = closed_loop(memory.clone());

        let unsure = lp.learn(&trajectory("t1", "???"), 1).await.unwrap();
        assert_eq!(unsure.stage, Stage::Discarded);
        assert_eq!(unsure.verdict(), Some(Verdict::Indeterminate));

        let shaky = lp.learn(&trajectory("t2", "shaky"), 2).await.unwrap();
        assert_eq!(shaky.stage, Stage::Discarded);
        assert!(shaky.reason.unwrap().contains("confidence"));

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn verdict_updates_counters_of_injected_items() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let seeded = memory
            .add(MemoryItem::new("Seed", "d", "c", SourceType::Human))
            .await
            .unwrap();
        let (lp, _) = closed_loop(memory.clone());

        let ids = vec![seeded.clone(), "0000000000000000".to_string()];
        lp.learn(&trajectory("t1", "good").with_memory_ids(ids.clone()), 1)
            .await
            .unwrap();
        lp.learn(&trajectory("t2", "bad").with_memory_ids(ids), 2)
            .await
            .unwrap();

        let item = &memory.get(&[seeded], 1).await.unwrap()[0];
        assert_eq!(item.success_count, 1);
        assert_eq!(item.failure_count, 1);
    }

    #[tokio::test]
    async fn failures_are_not_extracted_when_disabled() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let seeded = memory
            .add(MemoryItem::new("Seed", "d", "c", SourceType::Human))
            .await
            .unwrap();
        let extractor = Arc::new(TaskExtractor::default());
        let lp = ClosedLoop::new(
            Arc::new(AnswerJudge),
            extractor.clone(),
            memory.clone(),
            LearningConfig {
                learn_from_failures: false,
                ..config()
            },
        );

        let run = trajectory("t1", "bad").with_memory_ids(vec![seeded.clone()]);
        let outcome = lp.learn(&run, 1).await.unwrap();
        assert_eq!(outcome.stage, Stage::Discarded);
        assert_eq!(outcome.reason.as_deref(), Some("failure learning disabled"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.count().await.unwrap(), 1);

        // Blame is still recorded against the injected item.
        let item = &memory.get(&[seeded], 1).await.unwrap()[0];
        assert_eq!(item.failure_count, 1);

        // Successes are unaffected.
        let good = lp.learn(&trajectory("t2", "good"), 2).await.unwrap();
        assert_eq!(good.stage, Stage::Stored);
    }

    #[tokio::test]
    async fn batch_isolates_errors_and_grows_store_monotonically() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventBus::new(64));
        let mut rx = events.subscribe();
        let (lp, _) = closed_loop(memory.clone());
        let lp = lp.with_events(events);

        let runs = vec![
            trajectory("a", "good"),
            trajectory("b", "boom"),
            trajectory("c", "bad"),
            trajectory("d", "good").with_termination(Termination::SubCallBudget),
        ];
        let report = lp.learn_batch(&runs).await;

        assert_eq!(report.statuses.len(), 4);
        assert_eq!(report.successes(), 1);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.errors(), 1);
        assert_eq!(report.non_convergent(), 1);
        assert_eq!(memory.count().await.unwrap(), 2);

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::ErrorOccurred { error_message, .. } = event.as_ref() {
                saw_error |= error_message.contains("judge crashed");
            }
        }
        assert!(saw_error);

        // A second pass over the same runs never shrinks the store.
        let before = memory.count().await.unwrap();
        lp.learn_batch(&runs).await;
        assert!(memory.count().await.unwrap() >= before);
    }

    #[tokio::test]
    async fn consolidation_runs_in_windows() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let consolidator = Arc::new(CountingConsolidator {
            batches: std::sync::Mutex::new(Vec::new()),
        });
        let extractor = Arc::new(TaskExtractor::default());
        let lp = ClosedLoop::new(
            Arc::new(AnswerJudge),
            extractor,
            memory.clone(),
            LearningConfig {
                consolidate_every: 2,
                ..config()
            },
        )
        .with_consolidator(consolidator.clone());

        let runs: Vec<Trajectory> = (0..5)
            .map(|i| trajectory(&format!("t{i}"), if i % 2 == 0 { "good" } else { "bad" }))
            .collect();
        let report = lp.learn_batch(&runs).await;

        // Two full windows; the trailing single run is below min_batch.
        // Both windows yield the same lesson, so the second add is a no-op.
        assert_eq!(*consolidator.batches.lock().unwrap(), vec![2, 2]);
        assert_eq!(report.consolidated_ids.len(), 2);
        assert_eq!(report.consolidated_ids[0], report.consolidated_ids[1]);
        assert_eq!(memory.count().await.unwrap(), 5 + 1);
    }
}
