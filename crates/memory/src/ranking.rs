//! Lexical relevance with BM25 over title, tags and description.
//!
//! Content never participates in ranking: `search` callers choose ids from
//! metadata alone, so only metadata may decide the order.

use procmem_core::memory::MemoryItem;
use std::collections::{HashMap, HashSet};

/// BM25 parameter: term frequency saturation
const K1: f32 = 1.2;

/// BM25 parameter: length normalization factor
const B: f32 = 0.75;

/// Field weight multipliers
const WEIGHT_TITLE: f32 = 3.0;
const WEIGHT_TAGS: f32 = 2.0;
const WEIGHT_DESCRIPTION: f32 = 1.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "the", "that", "this", "to", "what", "which", "who", "with",
];

/// Lowercased alphanumeric tokens, stopwords and 1-char tokens removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Per-document weighted term frequencies and length.
struct DocStats {
    weighted_tf: HashMap<String, f32>,
    length: f32,
}

impl DocStats {
    fn of(item: &MemoryItem) -> Self {
        let mut weighted_tf: HashMap<String, f32> = HashMap::new();
        let mut length = 0usize;

        let tag_text = item.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        for (text, weight) in [
            (item.title.as_str(), WEIGHT_TITLE),
            (tag_text.as_str(), WEIGHT_TAGS),
            (item.description.as_str(), WEIGHT_DESCRIPTION),
        ] {
            for token in tokenize(text) {
                *weighted_tf.entry(token).or_insert(0.0) += weight;
                length += 1;
            }
        }

        Self {
            weighted_tf,
            length: length.max(1) as f32,
        }
    }
}

/// Score every item against `query`. Returns `(index, score)` for items
/// with a positive score, in input order.
pub fn score_items(items: &[&MemoryItem], query: &str) -> Vec<(usize, f32)> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();
    if terms.is_empty() || items.is_empty() {
        return Vec::new();
    }

    let docs: Vec<DocStats> = items.iter().map(|item| DocStats::of(item)).collect();
    let total_docs = docs.len() as f32;
    let avg_len = docs.iter().map(|d| d.length).sum::<f32>() / total_docs;

    let idf: HashMap<&str, f32> = terms
        .iter()
        .map(|term| {
            let df = docs
                .iter()
                .filter(|d| d.weighted_tf.contains_key(term))
                .count() as f32;
            // log((N - df + 0.5) / (df + 0.5) + 1); always positive
            let value = if df == 0.0 {
                0.0
            } else {
                ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln()
            };
            (term.as_str(), value)
        })
        .collect();

    docs.iter()
        .enumerate()
        .filter_map(|(i, doc)| {
            let score: f32 = terms
                .iter()
                .filter_map(|term| {
                    let tf = *doc.weighted_tf.get(term)?;
                    let norm = K1 * (1.0 - B + B * (doc.length / avg_len));
                    Some(idf[term.as_str()] * (tf * (K1 + 1.0)) / (tf + norm))
                })
                .sum();
            (score > 0.0).then_some((i, score))
        })
        .collect()
}

/// Scores are compared at this resolution so near-identical floats tie.
pub fn quantize(score: f32) -> i64 {
    (score as f64 * 1_000_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use procmem_core::memory::SourceType;

    fn item(title: &str, description: &str) -> MemoryItem {
        MemoryItem::new(title, description, "body", SourceType::Seed)
    }

    #[test]
    fn tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("How to walk the class-hierarchy?"),
            vec!["walk", "class", "hierarchy"]
        );
    }

    #[test]
    fn no_overlap_scores_nothing() {
        let a = item("Count proteins", "aggregate with COUNT");
        assert!(score_items(&[&a], "hierarchy navigation").is_empty());
    }

    #[test]
    fn title_match_beats_description_match() {
        let a = item("Hierarchy walk", "generic procedure");
        let b = item("Generic procedure", "hierarchy walk");
        let scores = score_items(&[&a, &b], "hierarchy");
        assert_eq!(scores.len(), 2);
        assert!(scores[0].1 > scores[1].1);
    }

    #[test]
    fn tags_contribute() {
        let a = item("Procedure one", "does things").with_tags(["taxonomy"]);
        let b = item("Procedure two", "does things");
        let scores = score_items(&[&a, &b], "taxonomy");
        assert_eq!(scores, vec![(0, scores[0].1)]);
    }

    #[test]
    fn content_is_not_indexed() {
        let a = MemoryItem::new("Plain title", "plain", "hierarchy hierarchy", SourceType::Seed);
        assert!(score_items(&[&a], "hierarchy").is_empty());
    }

    #[test]
    fn identical_shapes_tie_exactly() {
        let a = item("Hierarchy navigation alpha", "walk broader links");
        let b = item("Hierarchy navigation bravo", "walk broader links");
        let scores = score_items(&[&a, &b], "hierarchy navigation");
        assert_eq!(quantize(scores[0].1), quantize(scores[1].1));
    }
}
