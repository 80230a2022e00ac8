//! Prompt construction and reply parsing for the judge, extractor and
//! consolidator.

use procmem_core::trajectory::{Judgment, Trajectory};

/// Steps shown to the model, most recent last.
const MAX_STEPS_SHOWN: usize = 8;
/// Per-field clip inside a rendered step.
const STEP_FIELD_CHARS: usize = 600;
const ANSWER_CHARS: usize = 2_000;

pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}…")
}

fn render_steps(trajectory: &Trajectory) -> String {
    let steps = trajectory.steps();
    let skipped = steps.len().saturating_sub(MAX_STEPS_SHOWN);
    let mut out = String::new();
    if skipped > 0 {
        out.push_str(&format!("({skipped} earlier steps omitted)\n"));
    }
    for (i, step) in steps.iter().enumerate().skip(skipped) {
        out.push_str(&format!("Step {}:\n", i + 1));
        if !step.reasoning.is_empty() {
            out.push_str(&format!("  reasoning: {}\n", clip(&step.reasoning, STEP_FIELD_CHARS)));
        }
        if !step.code.is_empty() {
            out.push_str(&format!("  code: {}\n", clip(&step.code, STEP_FIELD_CHARS)));
        }
        if !step.output.is_empty() {
            out.push_str(&format!("  output: {}\n", clip(&step.output, STEP_FIELD_CHARS)));
        }
    }
    out
}

fn final_answer(trajectory: &Trajectory) -> String {
    trajectory
        .final_answer
        .as_deref()
        .map(|a| clip(a, ANSWER_CHARS))
        .unwrap_or_else(|| "(none)".to_string())
}

pub fn judge_prompt(trajectory: &Trajectory) -> String {
    format!(
        "You are grading whether an agent answered a task correctly.\n\n\
         TASK:\n{task}\n\n\
         FINAL ANSWER:\n{answer}\n\n\
         EVIDENCE (agent steps):\n{steps}\n\
         Decide whether the final answer correctly and completely answers the task. \
         Reply with JSON only:\n\
         {{\"verdict\": \"success\" | \"failure\", \"reason\": \"one sentence\", \"confidence\": 0.0-1.0}}",
        task = trajectory.task,
        answer = final_answer(trajectory),
        steps = render_steps(trajectory),
    )
}

pub fn extract_prompt(trajectory: &Trajectory, judgment: &Judgment, max_items: usize) -> String {
    let instruction = if judgment.is_success() {
        "This run SUCCEEDED. Extract reusable procedures: the steps, query patterns and \
         checks that made it work, written so they transfer to similar tasks."
    } else {
        "This run FAILED. Extract anti-patterns: what went wrong, how to recognize it early, \
         and what to do instead."
    };
    format!(
        "{instruction}\n\n\
         TASK:\n{task}\n\n\
         JUDGE: {verdict} ({reason})\n\n\
         FINAL ANSWER:\n{answer}\n\n\
         STEPS:\n{steps}\n\
         Reply with a JSON array of at most {max_items} items, each \
         {{\"title\": \"...\", \"description\": \"one line on when to use it\", \
         \"content\": \"numbered steps\", \"tags\": [\"...\"]}}. \
         Reply [] if nothing is worth keeping.",
        task = trajectory.task,
        verdict = judgment.verdict,
        reason = judgment.reason,
        answer = final_answer(trajectory),
        steps = render_steps(trajectory),
    )
}

pub fn consolidate_prompt(runs: &[(&Trajectory, &Judgment)], max_items: usize) -> String {
    let mut summary = String::new();
    for (i, (trajectory, judgment)) in runs.iter().enumerate() {
        summary.push_str(&format!(
            "Run {n} [{verdict}] task: {task}\n  answer: {answer}\n  judge: {reason}\n",
            n = i + 1,
            verdict = judgment.verdict,
            task = clip(&trajectory.task, 300),
            answer = clip(trajectory.final_answer.as_deref().unwrap_or("(none)"), 300),
            reason = clip(&judgment.reason, 200),
        ));
    }
    format!(
        "Below are {count} judged runs. Compare successes with failures and write \
         general lessons that hold across runs, not facts about one task.\n\n\
         {summary}\n\
         Reply with a JSON array of at most {max_items} items, each \
         {{\"title\": \"...\", \"description\": \"...\", \"content\": \"...\", \"tags\": [\"...\"]}}.",
        count = runs.len(),
    )
}

/// Locate a JSON object or array in model output: a fenced block if
/// present, otherwise the outermost bracketed span.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let fenced = body[..end].trim();
            if !fenced.is_empty() {
                return Some(fenced);
            }
        }
    }

    let open = text.find(['{', '['])?;
    let close_char = if text[open..].starts_with('{') { '}' } else { ']' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| &text[open..=close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use procmem_core::trajectory::Step;

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure:\n```json\n{\"verdict\": \"success\"}\n```\nDone.";
        assert_eq!(extract_json(text), Some("{\"verdict\": \"success\"}"));
    }

    #[test]
    fn extracts_bare_json() {
        let text = "Here you go [ {\"title\": \"a\"} ] hope that helps";
        assert_eq!(extract_json(text), Some("[ {\"title\": \"a\"} ]"));
    }

    #[test]
    fn no_json_is_none() {
        assert_eq!(extract_json("I cannot decide."), None);
    }

    #[test]
    fn judge_prompt_bounds_long_runs() {
        let steps = (0..50)
            .map(|i| Step::new(format!("thought {i}"), "x".repeat(5_000), "out"))
            .collect();
        let t = Trajectory::new("t", "count proteins", steps).with_answer("42");
        let prompt = judge_prompt(&t);
        assert!(prompt.contains("42 earlier steps omitted"));
        assert!(prompt.chars().count() < 12_000);
    }

    #[test]
    fn extract_prompt_switches_on_verdict() {
        let t = Trajectory::new("t", "count proteins", vec![]).with_answer("42");
        assert!(extract_prompt(&t, &Judgment::success("ok", 0.9), 3).contains("SUCCEEDED"));
        assert!(extract_prompt(&t, &Judgment::failure("wrong", 0.9), 3).contains("anti-patterns"));
    }
}
