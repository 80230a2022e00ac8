//! Bounded pool for sub-model calls issued from inside a run.
//!
//! The shared `CallBudget` is checked before a worker slot is taken, so an
//! exhausted budget fails immediately instead of queueing. A refusal is
//! remembered so the run can be marked non-convergent afterwards.

use procmem_core::error::LearningError;
use procmem_core::provider::{Provider, ProviderRequest};
use procmem_telemetry::{CallBudget, RunTrace, Span, SpanKind, TelemetryError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

fn budget_error(e: TelemetryError) -> LearningError {
    match e {
        TelemetryError::BudgetExceeded { used, limit } => {
            LearningError::BudgetExceeded { used, limit }
        }
    }
}

pub struct SubCallPool {
    provider: Arc<dyn Provider>,
    model: String,
    slots: Arc<Semaphore>,
    budget: Arc<CallBudget>,
    refused: Arc<AtomicBool>,
    trace: Option<Arc<RunTrace>>,
    max_tokens: Option<u32>,
}

impl SubCallPool {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        workers: usize,
        budget: Arc<CallBudget>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            slots: Arc::new(Semaphore::new(workers.max(1))),
            budget,
            refused: Arc::new(AtomicBool::new(false)),
            trace: None,
            max_tokens: None,
        }
    }

    pub fn with_trace(mut self, trace: Arc<RunTrace>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn budget(&self) -> &Arc<CallBudget> {
        &self.budget
    }

    /// Set once any call has been refused for lack of budget.
    pub fn refusals(&self) -> Arc<AtomicBool> {
        self.refused.clone()
    }

    pub fn budget_refused(&self) -> bool {
        self.refused.load(Ordering::SeqCst)
    }

    /// One prompt in, reply text out.
    pub async fn call(&self, prompt: &str, temperature: f32) -> Result<String, LearningError> {
        let n = self.budget.try_acquire().map_err(|e| {
            self.refused.store(true, Ordering::SeqCst);
            budget_error(e)
        })?;
        let _permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                self.budget.release();
                return Err(LearningError::SubCall("worker pool closed".into()));
            }
        };

        let mut span = Span::new(SpanKind::SubCall, format!("sub_call#{n}"));
        let mut request = ProviderRequest::prompt(self.model.clone(), prompt, temperature);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        let result = self.provider.complete(request).await;

        span.end(result.is_ok());
        if let Some(trace) = &self.trace {
            trace.record(span);
        }
        debug!(call = n, ok = result.is_ok(), "Sub-call finished");
        Ok(result?.message.content)
    }

    /// Fan out prompts over the pool. Results keep prompt order.
    pub async fn call_many(
        &self,
        prompts: &[String],
        temperature: f32,
    ) -> Vec<Result<String, LearningError>> {
        futures::future::join_all(prompts.iter().map(|p| self.call(p, temperature))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    #[tokio::test]
    async fn budget_is_checked_before_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(vec!["one", "two", "three"]));
        let budget = Arc::new(CallBudget::new(2));
        let pool = SubCallPool::new(provider.clone(), "m", 2, budget.clone());

        assert_eq!(pool.call("a", 0.7).await.unwrap(), "one");
        assert_eq!(pool.call("b", 0.7).await.unwrap(), "two");
        let err = pool.call("c", 0.7).await.unwrap_err();
        assert!(matches!(err, LearningError::BudgetExceeded { used: 2, limit: 2 }));
        assert_eq!(provider.call_count(), 2);
        assert!(pool.budget_refused());
    }

    #[tokio::test]
    async fn call_many_never_exceeds_budget_and_is_traced() {
        let provider = Arc::new(ScriptedProvider::new(vec!["r"; 10]));
        let trace = Arc::new(RunTrace::new("rollout"));
        let pool = SubCallPool::new(provider.clone(), "m", 3, Arc::new(CallBudget::new(4)))
            .with_trace(trace.clone());

        let prompts: Vec<String> = (0..10).map(|i| format!("p{i}")).collect();
        let results = pool.call_many(&prompts, 0.7).await;

        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
        assert_eq!(provider.call_count(), 4);
        assert_eq!(trace.summary().sub_calls, 4);
    }

    #[tokio::test]
    async fn provider_error_still_counts_against_budget() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let budget = Arc::new(CallBudget::new(5));
        let pool = SubCallPool::new(provider, "m", 1, budget.clone());
        assert!(matches!(pool.call("x", 0.0).await, Err(LearningError::Provider(_))));
        assert_eq!(budget.used(), 1);
        assert!(!pool.budget_refused());
    }
}
