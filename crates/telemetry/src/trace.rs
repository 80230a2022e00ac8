//! Execution spans for one rollout or learning pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A sub-model call issued through the worker pool.
    SubCall,
    /// A tool execution.
    ToolExecution,
    /// A memory search or fetch.
    Retrieval,
    /// A judge call.
    Judge,
    /// An extraction or consolidation call.
    Extraction,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubCall => write!(f, "sub_call"),
            Self::ToolExecution => write!(f, "tool_execution"),
            Self::Retrieval => write!(f, "retrieval"),
            Self::Judge => write!(f, "judge"),
            Self::Extraction => write!(f, "extraction"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub kind: SpanKind,
    /// Human-readable label (tool name, task id, ...).
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            started_at: Utc::now(),
            duration_ms: None,
            success: None,
        }
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        self.duration_ms = Some(
            Utc::now()
                .signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }
}

/// Per-kind counts over a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub sub_calls: usize,
    pub tool_executions: usize,
    pub retrievals: usize,
    pub judge_calls: usize,
    pub extraction_calls: usize,
    pub failures: usize,
    pub total_duration_ms: u64,
}

/// Thread-safe span collector shared by the workers of one run.
pub struct RunTrace {
    pub id: String,
    pub label: String,
    spans: RwLock<Vec<Span>>,
}

impl RunTrace {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            spans: RwLock::new(Vec::new()),
        }
    }

    /// Record a completed span.
    pub fn record(&self, span: Span) {
        self.spans
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(span);
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn summary(&self) -> TraceSummary {
        let spans = self.spans.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut summary = TraceSummary::default();
        for span in spans.iter() {
            match span.kind {
                SpanKind::SubCall => summary.sub_calls += 1,
                SpanKind::ToolExecution => summary.tool_executions += 1,
                SpanKind::Retrieval => summary.retrievals += 1,
                SpanKind::Judge => summary.judge_calls += 1,
                SpanKind::Extraction => summary.extraction_calls += 1,
            }
            if span.success == Some(false) {
                summary.failures += 1;
            }
            summary.total_duration_ms += span.duration_ms.unwrap_or(0);
        }
        summary
    }
}
