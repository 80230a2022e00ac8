//! End-to-end tests for the closed loop:
//! retrieve → inject → execute → judge → extract → store.
//!
//! The agent, judge and extractor are stubs; everything else (file-backed
//! store, context builder, tool registry, blob store) is the real thing.

use async_trait::async_trait;
use procmem_config::{ContextConfig, LearningConfig, MemoryConfig, RetrievalMode, RuntimeConfig};
use procmem_context::{ContextBuilder, DomainModel};
use procmem_core::error::LearningError;
use procmem_core::memory::{MemoryItem, MemoryQuery, MemoryStore, SourceType};
use procmem_core::tool::ToolCall;
use procmem_core::trajectory::{Judgment, Step, Termination, Trajectory};
use procmem_learning::{
    AgentRuntime, ClosedLoop, Extractor, Judge, Rollout, RolloutRunner, Task, TrajectoryStatus,
};
use procmem_memory::FileStore;
use procmem_telemetry::{Span, SpanKind};
use std::sync::Arc;

// ── Stubs ────────────────────────────────────────────────────────────────

/// Answers every task through the blob tools; tasks mentioning "impossible"
/// never converge.
struct BlobAgent;

#[async_trait]
impl AgentRuntime for BlobAgent {
    async fn run(&self, rollout: Rollout) -> Result<Trajectory, LearningError> {
        let mut span = Span::new(SpanKind::ToolExecution, "blob_put");
        let put = ToolCall {
            id: format!("{}-{}", rollout.task.id, rollout.index),
            name: "blob_put".into(),
            arguments: serde_json::json!({"content": "x".repeat(50_000), "dtype": "rows"}),
        };
        let stored = rollout
            .tools
            .execute(&put)
            .await
            .map_err(|e| LearningError::Runtime(e.to_string()))?;
        span.end(stored.success);
        rollout.trace.record(span);

        let steps = vec![
            Step::new("store rows", "blob_put(rows)", stored.output.clone()),
            Step::new("answer", "blob_stats", "size=50000 lines=1"),
        ];
        let trajectory = Trajectory::new(rollout.task.id.clone(), rollout.task.text.clone(), steps);
        if rollout.task.text.contains("impossible") {
            return Ok(trajectory.with_termination(Termination::MaxIterations));
        }
        Ok(trajectory.with_answer(format!("answered {}", rollout.task.id)))
    }
}

/// Succeeds on even-numbered tasks, fails on odd ones.
struct ParityJudge;

#[async_trait]
impl Judge for ParityJudge {
    async fn judge(&self, trajectory: &Trajectory) -> Result<Judgment, LearningError> {
        let n: u32 = trajectory.task_id.trim_start_matches('t').parse().unwrap_or(0);
        Ok(if n % 2 == 0 {
            Judgment::success("matches the reference", 0.9)
        } else {
            Judgment::failure("wrong aggregation", 0.9)
        })
    }
}

struct TitleExtractor;

#[async_trait]
impl Extractor for TitleExtractor {
    async fn extract(
        &self,
        trajectory: &Trajectory,
        judgment: &Judgment,
    ) -> Result<Vec<MemoryItem>, LearningError> {
        let source = if judgment.is_success() {
            SourceType::Success
        } else {
            SourceType::Failure
        };
        Ok(vec![
            MemoryItem::new(
                format!("Procedure: {}", trajectory.task),
                judgment.reason.clone(),
                "1. Store rows as a blob\n2. Inspect with blob_stats",
                source,
            )
            .with_tags(["blob"]),
        ])
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn model() -> DomainModel {
    DomainModel::new("uniprot")
}

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        rollout_workers: 2,
        rollouts_per_task: 2,
        ..RuntimeConfig::default()
    }
}

fn learning_config() -> LearningConfig {
    LearningConfig {
        learn_from_failures: true,
        min_batch: 2,
        consolidate_every: 0,
        min_confidence: 0.5,
    }
}

fn tasks() -> Vec<Task> {
    vec![
        Task::new("t0", "count proteins per organism"),
        Task::new("t1", "list enzymes without a name"),
        Task::new("t2", "impossible task"),
    ]
}

async fn run_round(
    store: Arc<dyn MemoryStore>,
    mode: RetrievalMode,
) -> (Vec<Trajectory>, procmem_learning::BatchReport) {
    let context = ContextConfig {
        retrieval_mode: mode,
        ..ContextConfig::default()
    };
    let builder = ContextBuilder::new(context).with_memory(store.clone(), MemoryConfig::default());
    let runner = RolloutRunner::new(Arc::new(BlobAgent), builder, model(), runtime_config())
        .with_memory(store.clone(), MemoryConfig::default());

    let trajectories: Vec<Trajectory> = runner
        .run(&tasks())
        .await
        .into_iter()
        .map(|r| r.result.expect("stub agent never errors"))
        .collect();

    let closed_loop = ClosedLoop::new(
        Arc::new(ParityJudge),
        Arc::new(TitleExtractor),
        store,
        learning_config(),
    );
    let report = closed_loop.learn_batch(&trajectories).await;
    (trajectories, report)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_loop_grows_the_store_monotonically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.jsonl");
    let store: Arc<dyn MemoryStore> = Arc::new(FileStore::open(&path).unwrap());

    let (trajectories, report) = run_round(store.clone(), RetrievalMode::AutoInject).await;
    assert_eq!(trajectories.len(), 6);
    assert_eq!(report.non_convergent(), 2);
    assert_eq!(report.successes(), 2);
    assert_eq!(report.failures(), 2);
    // Rollouts of one task extract the same procedure; ids are content hashes.
    let after_first = store.count().await.unwrap();
    assert_eq!(after_first, 2);

    let (second, _) = run_round(store.clone(), RetrievalMode::AutoInject).await;
    let after_second = store.count().await.unwrap();
    assert!(after_second >= after_first);

    // The second round had procedures to inject and credited them.
    assert!(second.iter().any(|t| !t.memory_ids.is_empty()));
    let credited = store.all().await.unwrap();
    assert!(credited.iter().any(|i| i.success_count + i.failure_count > 0));

    // Everything survives a reopen.
    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.count().await.unwrap(), after_second);
}

#[tokio::test]
async fn large_results_stay_behind_handles() {
    let store: Arc<dyn MemoryStore> = Arc::new(procmem_memory::InMemoryStore::new());
    let (trajectories, _) = run_round(store, RetrievalMode::ToolMediated).await;
    for t in &trajectories {
        // The 50 000-char payload never enters the trajectory, only its Ref.
        let first = &t.steps()[0].output;
        assert!(first.starts_with("<Ref rows_0"));
        assert!(first.len() < 200);
    }
}

#[tokio::test]
async fn extracted_procedures_are_searchable_without_content() {
    let store: Arc<dyn MemoryStore> = Arc::new(procmem_memory::InMemoryStore::new());
    let (_, report) = run_round(store.clone(), RetrievalMode::AutoInject).await;
    assert!(
        report
            .statuses
            .iter()
            .all(|s| matches!(s, TrajectoryStatus::Learned(_)))
    );

    let hits = store
        .search(&MemoryQuery::new("count proteins organism", 5))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_type, SourceType::Success);
    let json = serde_json::to_string(&hits).unwrap();
    assert!(!json.contains("Inspect with blob_stats"));
}
