//! Curriculum-aware retrieval.
//!
//! A query is classified into a complexity level from the vocabulary it
//! uses, then lexical candidates are regrouped into priority tiers around
//! that level and the task's domain. Lexical order is kept within a tier.

use procmem_core::memory::{CurriculumLevel, CurriculumScope, MemoryItem, SourceType};

/// A vocabulary family and the complexity points it contributes.
struct Signal {
    weight: u8,
    terms: &'static [&'static str],
}

const FILTER: Signal = Signal {
    weight: 1,
    terms: &[
        "where", "filter", "only", "whose", "greater", "less", "more than", "fewer", "before",
        "after", "between", "contains", "containing", "starting", "equal", "exactly",
        "at least", "at most", "above", "below",
    ],
};

const JOIN: Signal = Signal {
    weight: 1,
    terms: &[
        "and their", "along with", "together with", "related", "associated", "linked",
        "connected", "both", "corresponding", "annotated", "together",
    ],
};

const AGGREGATE: Signal = Signal {
    weight: 2,
    terms: &[
        "how many", "count", "number of", "total", "sum", "average", "mean", "maximum",
        "minimum", "most", "least", "top", "rank", "per", "group", "distinct",
    ],
};

const PATH: Signal = Signal {
    weight: 2,
    terms: &[
        "hierarchy", "ancestor", "ancestors", "descendant", "descendants", "subclass",
        "subclasses", "superclass", "superclasses", "transitive", "transitively", "path",
        "chain", "parent", "parents", "child", "children", "broader", "narrower",
        "all levels", "indirectly", "recursively", "lineage",
    ],
};

const NEGATION: Signal = Signal {
    weight: 1,
    terms: &[
        "not", "without", "except", "excluding", "never", "none", "missing", "lacking",
    ],
};

const SIGNALS: [&Signal; 5] = [&FILTER, &JOIN, &AGGREGATE, &PATH, &NEGATION];

/// Classify query text into a curriculum level (1..=5).
pub fn classify(text: &str) -> CurriculumLevel {
    // Stopword-free tokens would lose "how many" / "number of"; rebuild
    // from raw words instead.
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    let padded = format!(" {} ", words.join(" "));

    let mut points = 0u8;
    let mut matched_terms = 0usize;
    for signal in SIGNALS {
        let hits = signal
            .terms
            .iter()
            .filter(|term| padded.contains(&format!(" {term} ")))
            .count();
        if hits > 0 {
            points += signal.weight;
            matched_terms += hits;
        }
    }
    if matched_terms >= 4 {
        points += 1;
    }

    let level = match points {
        0 => 1,
        1 => 2,
        2..=3 => 3,
        4..=5 => 4,
        _ => 5,
    };
    CurriculumLevel::clamped(level)
}

/// Priority group of a candidate; lower is retrieved first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    ExactLevel = 0,
    AdjacentLevel = 1,
    SameDomain = 2,
    CrossDomain = 3,
    FarExemplar = 4,
}

fn same_domain(item: &MemoryItem, domain: Option<&str>) -> bool {
    match (item.domain.as_deref(), domain) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => true,
    }
}

/// Tier of `item` for a query at `target` level in `domain`.
pub fn tier(item: &MemoryItem, target: CurriculumLevel, domain: Option<&str>) -> Tier {
    if !same_domain(item, domain) {
        return Tier::CrossDomain;
    }
    match item.curriculum_level.map(|l| l.distance(target)) {
        Some(0) => Tier::ExactLevel,
        Some(1) => Tier::AdjacentLevel,
        _ if item.source_type != SourceType::Exemplar => Tier::SameDomain,
        _ => Tier::FarExemplar,
    }
}

/// Stable regroup of lexically ranked candidates by tier.
pub fn reorder<'a>(
    ranked: Vec<(&'a MemoryItem, f32)>,
    scope: &CurriculumScope,
    query_text: &str,
) -> Vec<(&'a MemoryItem, f32)> {
    let target = scope.level.unwrap_or_else(|| classify(query_text));
    let domain = scope.domain.as_deref();
    let mut ranked = ranked;
    ranked.sort_by_key(|(item, _)| tier(item, target, domain));
    tracing::debug!(
        level = target.get(),
        domain = domain.unwrap_or("-"),
        candidates = ranked.len(),
        "Curriculum reorder"
    );
    ranked
}
