//! Trajectories and judgments: the inputs and verdicts of the learning loop.
//!
//! A trajectory is produced by an external agent runtime and is read-only
//! from here on: judges and extractors borrow it, nothing mutates it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One reasoning/code/output step of an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub output: String,
}

impl Step {
    pub fn new(
        reasoning: impl Into<String>,
        code: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            reasoning: reasoning.into(),
            code: code.into(),
            output: output.into(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The agent produced a final answer.
    #[default]
    Converged,
    /// Iteration ceiling reached without an answer.
    MaxIterations,
    /// Sub-call ceiling reached without an answer.
    SubCallBudget,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// The ordered record of one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub task_id: String,

    /// The task statement the run tried to answer.
    pub task: String,

    /// Knowledge source the run was executed against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    steps: Vec<Step>,

    /// Final structured answer or artifact (query text, result summary, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,

    #[serde(default)]
    pub termination: Termination,

    /// Memory items injected into the run's context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_ids: Vec<String>,
}

impl Trajectory {
    pub fn new(task_id: impl Into<String>, task: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            task_id: task_id.into(),
            task: task.into(),
            domain: None,
            steps,
            final_answer: None,
            termination: Termination::Converged,
            memory_ids: Vec::new(),
        }
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.final_answer = Some(answer.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_memory_ids(mut self, ids: Vec<String>) -> Self {
        self.memory_ids = ids;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn iterations(&self) -> usize {
        self.steps.len()
    }

    pub fn is_converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// The judge's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    Failure,
    /// The judge's output could not be interpreted.
    Indeterminate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Indeterminate => "indeterminate",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub verdict: Verdict,
    pub reason: String,
    /// Clamped to `0.0..=1.0`.
    pub confidence: f32,
}

impl Judgment {
    pub fn new(verdict: Verdict, reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            verdict,
            reason: reason.into(),
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    pub fn success(reason: impl Into<String>, confidence: f32) -> Self {
        Self::new(Verdict::Success, reason, confidence)
    }

    pub fn failure(reason: impl Into<String>, confidence: f32) -> Self {
        Self::new(Verdict::Failure, reason, confidence)
    }

    pub fn indeterminate(reason: impl Into<String>) -> Self {
        Self::new(Verdict::Indeterminate, reason, 0.0)
    }

    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }
}
