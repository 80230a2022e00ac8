//! `procmem learn` and `procmem consolidate`: the closed loop over
//! recorded trajectories.

use procmem_config::AppConfig;
use procmem_core::memory::MemoryStore;
use procmem_core::trajectory::{Trajectory, Verdict};
use procmem_learning::{
    ClosedLoop, Consolidator, Judge, JudgedRun, LlmConsolidator, LlmExtractor, LlmJudge,
    TrajectoryStatus,
};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::open_store;

/// One trajectory object, or an array of them.
pub fn parse_trajectories(content: &str) -> Result<Vec<Trajectory>, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(content)? {
        serde_json::Value::Array(values) => {
            values.into_iter().map(serde_json::from_value).collect()
        }
        value => Ok(vec![serde_json::from_value(value)?]),
    }
}

/// One trajectory per non-blank line.
pub fn parse_trajectory_lines(content: &str) -> Result<Vec<Trajectory>, String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))
        })
        .collect()
}

pub async fn learn(
    config: &AppConfig,
    path: &Path,
    no_failures: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let trajectories = parse_trajectories(&content)
        .map_err(|e| format!("Invalid trajectory file {}: {e}", path.display()))?;

    let provider = procmem_providers::from_config(&config.provider)?;
    let model = config.provider.model.clone();
    let mut learning = config.learning.clone();
    if no_failures {
        learning.learn_from_failures = false;
    }

    let judge = LlmJudge::new(provider.clone(), model.clone())
        .with_temperature(config.provider.judge_temperature)
        .with_max_tokens(config.provider.max_tokens);
    let extractor = LlmExtractor::new(provider.clone(), model.clone())
        .with_temperature(config.provider.extract_temperature)
        .with_max_tokens(config.provider.max_tokens)
        .learn_from_failures(learning.learn_from_failures);
    let consolidator = LlmConsolidator::new(provider, model)
        .with_temperature(config.provider.extract_temperature)
        .with_max_tokens(config.provider.max_tokens)
        .with_min_batch(learning.min_batch);

    let store: Arc<dyn MemoryStore> = Arc::new(open_store(config)?);
    let before = store.count().await?;
    let closed_loop = ClosedLoop::new(Arc::new(judge), Arc::new(extractor), store.clone(), learning)
        .with_consolidator(Arc::new(consolidator));

    println!("🔁 Learning from {} trajectories", trajectories.len());
    let report = closed_loop.learn_batch(&trajectories).await;
    for status in &report.statuses {
        match status {
            TrajectoryStatus::Learned(outcome) => {
                let verdict = outcome
                    .verdict()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "not judged".into());
                match &outcome.reason {
                    Some(reason) => {
                        println!("  ⏭️  {} [{verdict}] discarded: {reason}", outcome.task_id)
                    }
                    None => println!(
                        "  ✅ {} [{verdict}] stored {}",
                        outcome.task_id,
                        outcome.stored_ids.join(", ")
                    ),
                }
            }
            TrajectoryStatus::Error { task_id, error } => println!("  ❌ {task_id}: {error}"),
        }
    }
    for error in &report.consolidation_errors {
        println!("  ⚠️  consolidation: {error}");
    }

    let after = store.count().await?;
    println!();
    println!(
        "   {} success / {} failure / {} indeterminate / {} errors",
        report.successes(),
        report.failures(),
        report.indeterminate(),
        report.errors()
    );
    println!("   Store: {before} -> {after} procedures");
    Ok(())
}

/// Judge converged runs for consolidation. A judge error skips that run
/// and is returned alongside the runs that were judged.
pub async fn judge_runs(
    judge: &dyn Judge,
    trajectories: Vec<Trajectory>,
) -> (Vec<JudgedRun>, Vec<(String, String)>) {
    let mut batch = Vec::new();
    let mut skipped = Vec::new();
    for (i, trajectory) in trajectories.into_iter().enumerate() {
        if !trajectory.is_converged() {
            continue;
        }
        let judgment = match judge.judge(&trajectory).await {
            Ok(judgment) => judgment,
            Err(e) => {
                warn!(task_id = %trajectory.task_id, error = %e, "Judging failed, skipping run");
                skipped.push((trajectory.task_id, e.to_string()));
                continue;
            }
        };
        if judgment.verdict == Verdict::Indeterminate {
            continue;
        }
        batch.push(JudgedRun {
            trajectory,
            judgment,
            iteration: u32::try_from(i + 1).unwrap_or(u32::MAX),
        });
    }
    (batch, skipped)
}

pub async fn consolidate(
    config: &AppConfig,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let trajectories = parse_trajectory_lines(&content)
        .map_err(|e| format!("Invalid trajectory file {}: {e}", path.display()))?;

    let provider = procmem_providers::from_config(&config.provider)?;
    let model = config.provider.model.clone();
    let judge = LlmJudge::new(provider.clone(), model.clone())
        .with_temperature(config.provider.judge_temperature)
        .with_max_tokens(config.provider.max_tokens);

    let (batch, skipped) = judge_runs(&judge, trajectories).await;
    for (task_id, error) in &skipped {
        println!("  ❌ {task_id}: {error}");
    }

    let consolidator = LlmConsolidator::new(provider, model)
        .with_temperature(config.provider.extract_temperature)
        .with_max_tokens(config.provider.max_tokens)
        .with_min_batch(config.learning.min_batch);
    let items = consolidator.consolidate(&batch).await?;

    let store = open_store(config)?;
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        ids.push(store.add(item).await?);
    }
    println!("🧩 Consolidated {} judged runs into {} procedures", batch.len(), ids.len());
    for id in ids {
        println!("   {id}");
    }
    Ok(())
}
