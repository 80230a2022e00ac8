//! Judging: did a trajectory answer its task?

use async_trait::async_trait;
use procmem_core::error::LearningError;
use procmem_core::provider::{Provider, ProviderRequest};
use procmem_core::trajectory::{Judgment, Trajectory, Verdict};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompts;

#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, trajectory: &Trajectory) -> Result<Judgment, LearningError>;
}

#[derive(Debug, Deserialize)]
struct JudgeReply {
    verdict: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    confidence: Option<f32>,
}

fn parse_verdict(raw: &str) -> Verdict {
    match raw.trim().to_ascii_lowercase().as_str() {
        "success" | "pass" | "correct" | "yes" => Verdict::Success,
        "failure" | "fail" | "incorrect" | "no" => Verdict::Failure,
        _ => Verdict::Indeterminate,
    }
}

/// Interpret judge output. Anything unparseable is indeterminate.
pub fn parse_judgment(text: &str) -> Judgment {
    let Some(json) = prompts::extract_json(text) else {
        warn!("Judge reply contained no JSON");
        return Judgment::indeterminate("judge reply contained no JSON");
    };
    match serde_json::from_str::<JudgeReply>(json) {
        Ok(reply) => {
            let verdict = parse_verdict(&reply.verdict);
            if verdict == Verdict::Indeterminate {
                warn!(verdict = %reply.verdict, "Judge returned an unknown verdict");
                return Judgment::indeterminate(format!("unknown verdict '{}'", reply.verdict));
            }
            Judgment::new(verdict, reply.reason, reply.confidence.unwrap_or(0.5))
        }
        Err(e) => {
            warn!(error = %e, "Judge reply was malformed");
            Judgment::indeterminate(format!("malformed judge reply: {e}"))
        }
    }
}

/// LLM-backed judge. Always runs at the configured (cold) temperature.
pub struct LlmJudge {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 512,
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
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, trajectory: &Trajectory) -> Result<Judgment, LearningError> {
        if trajectory.final_answer.as_deref().is_none_or(|a| a.trim().is_empty()) {
            return Ok(Judgment::failure("run produced no final answer", 1.0));
        }

        let request = ProviderRequest::prompt(
            self.model.clone(),
            prompts::judge_prompt(trajectory),
            self.temperature,
        )
        .with_max_tokens(self.max_tokens);
        let response = self.provider.complete(request).await?;
        let judgment = parse_judgment(&response.message.content);
        debug!(
            task_id = %trajectory.task_id,
            verdict = %judgment.verdict,
            confidence = judgment.confidence,
            "Trajectory judged"
        );
        Ok(judgment)
    }
}
