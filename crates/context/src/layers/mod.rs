//! The four context layers, each a pure render into a character budget.

pub mod constraints;
pub mod guide;
pub mod memory;
pub mod orientation;

/// What one layer rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerOutput {
    pub text: String,
    pub items_included: usize,
    pub items_total: usize,
    pub truncated: bool,
}

impl LayerOutput {
    pub fn empty(items_total: usize) -> Self {
        Self {
            items_total,
            truncated: items_total > 0,
            ..Self::default()
        }
    }
}

/// Append whole lines under `header` while they fit in `budget` chars.
pub(crate) fn fill_lines(header: &str, lines: &[String], budget: usize) -> LayerOutput {
    let mut text = header.to_string();
    let mut used = header.chars().count();
    let mut included = 0;
    for line in lines {
        let cost = 1 + line.chars().count();
        if used + cost > budget {
            break;
        }
        text.push('\n');
        text.push_str(line);
        used += cost;
        included += 1;
    }
    if included == 0 {
        return LayerOutput::empty(lines.len());
    }
    LayerOutput {
        text,
        items_included: included,
        items_total: lines.len(),
        truncated: included < lines.len(),
    }
}
