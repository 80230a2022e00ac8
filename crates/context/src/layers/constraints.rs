//! L1: constraints phrased as warnings about queries that will go wrong.

use super::{LayerOutput, fill_lines};
use crate::domain::{Constraint, DomainModel};

const HEADER: &str = "## Constraints (avoid these mistakes)";

fn warning(model: &DomainModel, constraint: &Constraint) -> String {
    match constraint {
        Constraint::Functional { property } => format!(
            "- {} is functional: one value per subject. Do not expect several rows per subject.",
            model.compact(property)
        ),
        Constraint::InverseFunctional { property } => format!(
            "- {} is inverse-functional: a value identifies one subject. Use it as a join key.",
            model.compact(property)
        ),
        Constraint::Cardinality {
            class,
            property,
            min,
            max,
        } => {
            let bounds = match (min, max) {
                (Some(lo), Some(hi)) if lo == hi => format!("exactly {lo}"),
                (Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                (Some(lo), None) => format!("at least {lo}"),
                (None, Some(hi)) => format!("at most {hi}"),
                (None, None) => "an unknown number of".to_string(),
            };
            format!(
                "- {} has {bounds} values of {}. Check counts before aggregating.",
                model.compact(class),
                model.compact(property)
            )
        }
        Constraint::Disjoint { classes } => {
            let names = classes
                .iter()
                .map(|c| model.compact(c))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "- {names} are disjoint. A pattern requiring more than one of them matches nothing."
            )
        }
    }
}

pub fn render(model: &DomainModel, budget: usize) -> LayerOutput {
    let lines: Vec<String> = model
        .ranked_constraints()
        .into_iter()
        .map(|c| warning(model, c))
        .collect();
    if lines.is_empty() {
        return LayerOutput::empty(0);
    }
    fill_lines(HEADER, &lines, budget)
}
