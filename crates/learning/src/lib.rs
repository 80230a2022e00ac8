//! The closed learning loop for procmem.
//!
//! Finished runs are judged, procedures are extracted from the ones worth
//! learning from, and the results are written back to the memory store.
//! Batches of judged runs can additionally be consolidated into
//! cross-run lessons. `RolloutRunner` drives the k-rollout sampling that
//! produces those runs; the agent itself is supplied by the caller.

pub mod consolidator;
pub mod controller;
pub mod extractor;
pub mod judge;
pub mod prompts;
pub mod rollout;
pub mod subcall;

#[cfg(test)]
mod test_support;

pub use consolidator::{Consolidator, JudgedRun, LlmConsolidator};
pub use controller::{BatchReport, ClosedLoop, LearningOutcome, Stage, TrajectoryStatus};
pub use extractor::{Extractor, LlmExtractor};
pub use judge::{Judge, LlmJudge, parse_judgment};
pub use rollout::{AgentRuntime, Rollout, RolloutResult, RolloutRunner, Task};
pub use subcall::SubCallPool;
