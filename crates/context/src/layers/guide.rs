//! L3: extractive compression of a reference guide.

use super::LayerOutput;
use crate::truncate::{last_sentence_end, truncate};

const HEADER: &str = "## Guide";

/// Trim line ends, collapse runs of spaces and runs of blank lines.
pub fn normalize(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(collapsed);
            blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Normalize, then cut at the last sentence end that fits `max_chars`.
pub fn compress(text: &str, max_chars: usize) -> String {
    let normalized = normalize(text);
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let limit = normalized
        .char_indices()
        .nth(max_chars)
        .map_or(normalized.len(), |(i, _)| i);
    match last_sentence_end(&normalized, limit) {
        Some(end) => normalized[..end].to_string(),
        None => truncate(&normalized, max_chars),
    }
}

pub fn render(guide: &str, budget: usize) -> LayerOutput {
    let header_cost = HEADER.chars().count() + 1;
    if guide.trim().is_empty() {
        return LayerOutput::empty(0);
    }
    if budget <= header_cost {
        return LayerOutput::empty(1);
    }
    let normalized_len = normalize(guide).chars().count();
    let body = compress(guide, budget - header_cost);
    if body.is_empty() {
        return LayerOutput::empty(1);
    }
    LayerOutput {
        truncated: body.chars().count() < normalized_len,
        text: format!("{HEADER}\n{body}"),
        items_included: 1,
        items_total: 1,
    }
}
