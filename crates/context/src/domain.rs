//! Structural description of a knowledge source.
//!
//! Produced offline by whatever profiles the source; loaded here from JSON
//! and rendered into the orientation and constraint layers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub iri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub iri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

/// A machine-derived constraint on the source's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// No instance belongs to more than one of these classes.
    Disjoint { classes: Vec<String> },
    /// Bounds on how many values `property` takes for instances of `class`.
    Cardinality {
        class: String,
        property: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },
    /// Each subject has at most one value.
    Functional { property: String },
    /// Each value identifies at most one subject.
    InverseFunctional { property: String },
}

impl Constraint {
    /// Lower sorts first: the constraints most likely to change a query.
    pub fn actionability(&self) -> u8 {
        match self {
            Self::Functional { .. } => 0,
            Self::InverseFunctional { .. } => 1,
            Self::Cardinality { .. } => 2,
            Self::Disjoint { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_count: Option<u64>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default)]
    pub properties: Vec<PropertyInfo>,
    /// prefix -> namespace
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    /// e.g. "OWL", "SKOS", "RDFS"
    #[serde(default)]
    pub formalisms: Vec<String>,
    #[serde(default)]
    pub hierarchy_predicates: Vec<String>,
    #[serde(default)]
    pub label_predicates: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl DomainModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Shorten an IRI with the longest matching namespace.
    pub fn compact(&self, iri: &str) -> String {
        self.prefixes
            .iter()
            .filter(|(_, ns)| !ns.is_empty() && iri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{prefix}:{}", &iri[ns.len()..]))
            .unwrap_or_else(|| iri.to_string())
    }

    /// Classes without a parent inside the model, in declaration order.
    pub fn root_classes(&self) -> Vec<&ClassInfo> {
        let known: HashSet<&str> = self.classes.iter().map(|c| c.iri.as_str()).collect();
        self.classes
            .iter()
            .filter(|c| c.parent.as_deref().is_none_or(|p| !known.contains(p)))
            .collect()
    }

    /// Up to `n` classes with the most instances; ties by IRI.
    pub fn largest_classes(&self, n: usize) -> Vec<&ClassInfo> {
        let mut counted: Vec<&ClassInfo> =
            self.classes.iter().filter(|c| c.instances.is_some()).collect();
        counted.sort_by(|a, b| b.instances.cmp(&a.instances).then_with(|| a.iri.cmp(&b.iri)));
        counted.truncate(n);
        counted
    }

    /// Constraints ordered by actionability, stable within a kind.
    pub fn ranked_constraints(&self) -> Vec<&Constraint> {
        let mut ranked: Vec<&Constraint> = self.constraints.iter().collect();
        ranked.sort_by_key(|c| c.actionability());
        ranked
    }
}
