//! L0: what the knowledge source is and where to start.

use super::LayerOutput;
use crate::domain::DomainModel;
use crate::truncate::truncate;

const MAX_ROOTS: usize = 12;
const MAX_LARGEST: usize = 5;

fn join_compact<'a>(model: &DomainModel, iris: impl IntoIterator<Item = &'a str>) -> String {
    iris.into_iter()
        .map(|iri| model.compact(iri))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render(model: &DomainModel, budget: usize) -> LayerOutput {
    let mut lines = vec![format!("## Orientation: {}", model.name)];

    let size = match model.statement_count {
        Some(n) => format!(
            "Size: {n} statements, {} classes, {} properties",
            model.classes.len(),
            model.properties.len()
        ),
        None => format!(
            "Size: {} classes, {} properties",
            model.classes.len(),
            model.properties.len()
        ),
    };
    lines.push(size);

    if !model.formalisms.is_empty() {
        lines.push(format!("Formalisms: {}", model.formalisms.join(", ")));
    }
    if !model.prefixes.is_empty() {
        let prefixes = model
            .prefixes
            .iter()
            .map(|(p, ns)| format!("{p}: <{ns}>"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Prefixes: {prefixes}"));
    }

    let roots = model.root_classes();
    if !roots.is_empty() {
        let shown = join_compact(model, roots.iter().take(MAX_ROOTS).map(|c| c.iri.as_str()));
        let more = roots.len().saturating_sub(MAX_ROOTS);
        if more > 0 {
            lines.push(format!("Root classes: {shown} (+{more} more)"));
        } else {
            lines.push(format!("Root classes: {shown}"));
        }
    }
    if !model.hierarchy_predicates.is_empty() {
        lines.push(format!(
            "Hierarchy predicates: {}",
            join_compact(model, model.hierarchy_predicates.iter().map(String::as_str))
        ));
    }
    if !model.label_predicates.is_empty() {
        lines.push(format!(
            "Label predicates: {}",
            join_compact(model, model.label_predicates.iter().map(String::as_str))
        ));
    }

    let largest = model.largest_classes(MAX_LARGEST);
    if !largest.is_empty() {
        let shown = largest
            .iter()
            .map(|c| format!("{} ({})", model.compact(&c.iri), c.instances.unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Largest classes: {shown}"));
    }

    let full = lines.join("\n");
    let text = truncate(&full, budget);
    let truncated = text.len() < full.len();
    let items_included = text.lines().count();
    LayerOutput {
        text,
        items_included,
        items_total: lines.len(),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClassInfo;

    fn model() -> DomainModel {
        let mut m = DomainModel::new("uniprot");
        m.statement_count = Some(1_000_000);
        m.formalisms = vec!["OWL".into(), "SKOS".into()];
        m.prefixes.insert("up".into(), "http://purl.uniprot.org/core/".into());
        m.hierarchy_predicates = vec!["http://www.w3.org/2000/01/rdf-schema#subClassOf".into()];
        m.classes = vec![ClassInfo {
            iri: "http://purl.uniprot.org/core/Protein".into(),
            instances: Some(42),
            ..Default::default()
        }];
        m
    }

    #[test]
    fn renders_key_facts() {
        let out = render(&model(), 2_000);
        assert!(out.text.starts_with("## Orientation: uniprot"));
        assert!(out.text.contains("1000000 statements"));
        assert!(out.text.contains("Formalisms: OWL, SKOS"));
        assert!(out.text.contains("Root classes: up:Protein"));
        assert!(out.text.contains("Largest classes: up:Protein (42)"));
        assert!(!out.truncated);
    }

    #[test]
    fn respects_budget() {
        let out = render(&model(), 60);
        assert!(out.text.chars().count() <= 60);
        assert!(out.truncated);
    }
}
