//! Call budgets and execution tracing for procmem runs.
//!
//! Provides the shared sub-call counter that stops runaway model usage and
//! span-based tracing of sub-calls, tool executions, retrievals and
//! learning steps.

pub mod budget;
pub mod trace;

pub use budget::CallBudget;
pub use trace::{RunTrace, Span, SpanKind, TraceSummary};

/// Errors from the telemetry subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    #[error("budget exceeded: {used} of {limit} calls used")]
    BudgetExceeded { used: u64, limit: u64 },
}
