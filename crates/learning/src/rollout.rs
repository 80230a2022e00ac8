//! k-rollout sampling over a batch of tasks.
//!
//! Every rollout is isolated: it gets its own `BlobStore`, its own tool
//! registry and, when a provider is configured, its own sub-call budget.
//! Only the memory store is shared. The agent itself is external and plugs
//! in through `AgentRuntime`.

use async_trait::async_trait;
use procmem_config::{MemoryConfig, RetrievalMode, RuntimeConfig};
use procmem_context::{AssembledContext, ContextBuilder, DomainModel};
use procmem_core::error::LearningError;
use procmem_core::memory::{CurriculumScope, MemoryStore};
use procmem_core::provider::Provider;
use procmem_core::query::QueryEngine;
use procmem_core::tool::ToolRegistry;
use procmem_core::trajectory::{Termination, Trajectory};
use procmem_telemetry::{CallBudget, RunTrace};
use procmem_tools::{BlobStore, MemoryAccess, run_registry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::subcall::SubCallPool;

/// One task to sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
}

impl Task {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Everything one agent run needs.
pub struct Rollout {
    pub task: Task,
    /// 0-based rollout number within the task.
    pub index: usize,
    pub context: AssembledContext,
    pub tools: ToolRegistry,
    pub blobs: Arc<BlobStore>,
    pub subcalls: Option<SubCallPool>,
    pub max_iterations: u32,
    pub trace: Arc<RunTrace>,
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(&self, rollout: Rollout) -> Result<Trajectory, LearningError>;
}

#[derive(Debug)]
pub struct RolloutResult {
    pub task_id: String,
    pub index: usize,
    pub result: Result<Trajectory, LearningError>,
}

pub struct RolloutRunner {
    runtime: Arc<dyn AgentRuntime>,
    builder: Arc<ContextBuilder>,
    model: Arc<DomainModel>,
    config: RuntimeConfig,
    engine: Option<Arc<dyn QueryEngine>>,
    memory: Option<(Arc<dyn MemoryStore>, MemoryConfig)>,
    subcall_provider: Option<(Arc<dyn Provider>, String)>,
}

impl RolloutRunner {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        builder: ContextBuilder,
        model: DomainModel,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            runtime,
            builder: Arc::new(builder),
            model: Arc::new(model),
            config,
            engine: None,
            memory: None,
            subcall_provider: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Store exposed to tool-mediated runs. Give the builder the same store.
    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>, config: MemoryConfig) -> Self {
        self.memory = Some((store, config));
        self
    }

    pub fn with_subcalls(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.subcall_provider = Some((provider, model.into()));
        self
    }

    fn memory_access(&self) -> Option<MemoryAccess> {
        if self.builder.config().retrieval_mode != RetrievalMode::ToolMediated {
            return None;
        }
        let (store, config) = self.memory.as_ref()?;
        let domain = (!self.model.name.is_empty()).then(|| self.model.name.clone());
        Some(MemoryAccess {
            store: store.clone(),
            search_k: config.search_k,
            max_get: config.max_get,
            curriculum: config.curriculum.then(|| CurriculumScope {
                domain,
                level: None,
            }),
        })
    }

    fn prepare(&self, task: &Task, index: usize, context: AssembledContext) -> Rollout {
        let blobs = Arc::new(BlobStore::new());
        let tools = run_registry(blobs.clone(), self.engine.clone(), self.memory_access());
        let trace = Arc::new(RunTrace::new(format!("{}#{index}", task.id)));
        let subcalls = self.subcall_provider.as_ref().map(|(provider, model)| {
            SubCallPool::new(
                provider.clone(),
                model.clone(),
                self.config.subcall_workers,
                Arc::new(CallBudget::new(self.config.max_subcalls)),
            )
            .with_trace(trace.clone())
        });
        Rollout {
            task: task.clone(),
            index,
            context,
            tools,
            blobs,
            subcalls,
            max_iterations: self.config.max_iterations,
            trace,
        }
    }

    /// Run `rollouts_per_task` rollouts for every task, at most
    /// `rollout_workers` at a time. Results come back in task order, then
    /// rollout order.
    pub async fn run(&self, tasks: &[Task]) -> Vec<RolloutResult> {
        let slots = Arc::new(Semaphore::new(self.config.rollout_workers.max(1)));
        let k = self.config.rollouts_per_task.max(1);
        let mut handles = Vec::with_capacity(tasks.len() * k);

        for task in tasks {
            let context = self.builder.build(&task.text, &self.model).await;
            for index in 0..k {
                let rollout = self.prepare(task, index, context.clone());
                let runtime = self.runtime.clone();
                let slots = slots.clone();
                let domain = (!self.model.name.is_empty()).then(|| self.model.name.clone());
                let max_iterations = self.config.max_iterations;
                let handle = tokio::spawn(async move {
                    let _permit = slots
                        .acquire_owned()
                        .await
                        .map_err(|e| LearningError::Runtime(e.to_string()))?;
                    let injected = rollout.context.memory_ids.clone();
                    let refusals = rollout.subcalls.as_ref().map(SubCallPool::refusals);
                    let trajectory = runtime.run(rollout).await?;
                    let over_budget = refusals.is_some_and(|r| r.load(Ordering::SeqCst));
                    Ok::<_, LearningError>(finish(
                        trajectory,
                        injected,
                        domain,
                        max_iterations,
                        over_budget,
                    ))
                });
                handles.push((task.id.clone(), index, handle));
            }
        }

        let mut results = Vec::with_capacity(handles.len());
        for (task_id, index, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(LearningError::Runtime(format!("rollout task panicked: {e}"))),
            };
            match &result {
                Ok(t) => debug!(
                    task_id = %task_id,
                    index,
                    converged = t.is_converged(),
                    "Rollout finished"
                ),
                Err(e) => warn!(task_id = %task_id, index, error = %e, "Rollout failed"),
            }
            results.push(RolloutResult {
                task_id,
                index,
                result,
            });
        }

        info!(
            tasks = tasks.len(),
            rollouts = results.len(),
            converged = results
                .iter()
                .filter(|r| r.result.as_ref().is_ok_and(Trajectory::is_converged))
                .count(),
            "Rollouts finished"
        );
        results
    }
}

/// Fill in what the runner knows and enforce the iteration and sub-call
/// ceilings. A run that was refused a sub-call never counts as converged,
/// whatever the runtime reported.
fn finish(
    mut trajectory: Trajectory,
    injected: Vec<String>,
    domain: Option<String>,
    max_iterations: u32,
    over_budget: bool,
) -> Trajectory {
    if trajectory.memory_ids.is_empty() && !injected.is_empty() {
        trajectory = trajectory.with_memory_ids(injected);
    }
    if trajectory.domain.is_none() {
        trajectory.domain = domain;
    }
    if trajectory.is_converged() && over_budget {
        trajectory = trajectory.with_termination(Termination::SubCallBudget);
    }
    if trajectory.is_converged() && trajectory.iterations() > max_iterations as usize {
        trajectory = trajectory.with_termination(Termination::MaxIterations);
    }
    trajectory
}
