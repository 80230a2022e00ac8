//! Memory trait: durable procedural knowledge with two-phase retrieval.
//!
//! Retrieval is split so it can never flood a context window:
//! - `search` returns ranked metadata only (no content)
//! - `get` materializes at most `max_n` full records
//!
//! Records are content-addressed: the id is derived from title + content,
//! so inserting the same procedure twice is a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::MemoryError;

/// Where a memory item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Human,
    Success,
    Failure,
    MetaAnalysis,
    Exemplar,
    Seed,
    Principle,
    Episode,
    Contrastive,
}

impl SourceType {
    /// Tie-break rank on equal lexical score; lower wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Human => 0,
            Self::MetaAnalysis => 1,
            Self::Principle => 2,
            Self::Seed => 3,
            Self::Exemplar => 4,
            Self::Success => 5,
            Self::Episode => 6,
            Self::Contrastive => 7,
            Self::Failure => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::MetaAnalysis => "meta-analysis",
            Self::Exemplar => "exemplar",
            Self::Seed => "seed",
            Self::Principle => "principle",
            Self::Episode => "episode",
            Self::Contrastive => "contrastive",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "human" => Ok(Self::Human),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "meta-analysis" | "meta" => Ok(Self::MetaAnalysis),
            "exemplar" => Ok(Self::Exemplar),
            "seed" => Ok(Self::Seed),
            "principle" => Ok(Self::Principle),
            "episode" => Ok(Self::Episode),
            "contrastive" => Ok(Self::Contrastive),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

/// Ordinal complexity tier, 1 (simple lookup) to 5 (multi-hop aggregate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CurriculumLevel(u8);

impl CurriculumLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// Clamp an arbitrary score into the valid range.
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Absolute distance between two levels.
    pub fn distance(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<u8> for CurriculumLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("curriculum level {value} outside 1..=5"))
    }
}

impl From<CurriculumLevel> for u8 {
    fn from(level: CurriculumLevel) -> Self {
        level.0
    }
}

impl fmt::Display for CurriculumLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Where and how a memory item was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Free-form origin (file name, "cli", "extractor", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Task the item was learned from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Batch statistics for meta-analysis items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectories_analyzed: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_range: Option<(u32, u32)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,

    /// The judge's reason for the verdict that produced this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_reason: Option<String>,
}

impl Provenance {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..Self::default()
        }
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            origin: None,
            task_id: None,
            created_at: Utc::now(),
            trajectories_analyzed: None,
            iteration_range: None,
            pass_rate: None,
            judge_reason: None,
        }
    }
}

/// A reusable procedure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Content hash of title + content. See [`MemoryItem::compute_id`].
    pub id: String,

    pub title: String,

    /// One or two sentences used for ranking and for choosing what to fetch.
    pub description: String,

    /// The procedure itself. Never returned by `search`.
    pub content: String,

    pub source_type: SourceType,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum_level: Option<CurriculumLevel>,

    /// Knowledge source this item was learned on. `None` = domain-agnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default)]
    pub provenance: Provenance,

    /// Runs that used this item and were judged successful.
    #[serde(default)]
    pub success_count: u32,

    /// Runs that used this item and were judged failed.
    #[serde(default)]
    pub failure_count: u32,
}

impl MemoryItem {
    /// Create an item; the id is derived from `title` and `content`.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        let title = title.into();
        let content = content.into();
        Self {
            id: Self::compute_id(&title, &content),
            title,
            description: description.into(),
            content,
            source_type,
            tags: BTreeSet::new(),
            curriculum_level: None,
            domain: None,
            provenance: Provenance::default(),
            success_count: 0,
            failure_count: 0,
        }
    }

    /// First 16 hex chars of SHA-256 over `title \0 content`.
    pub fn compute_id(title: &str, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Whether `id` matches the content hash.
    pub fn has_valid_id(&self) -> bool {
        self.id == Self::compute_id(&self.title, &self.content)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_level(mut self, level: CurriculumLevel) -> Self {
        self.curriculum_level = Some(level);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Metadata view returned by `search`.
    pub fn to_hit(&self, score: f32) -> MemoryHit {
        MemoryHit {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            source_type: self.source_type,
            curriculum_level: self.curriculum_level,
            score,
        }
    }
}

/// A search result: everything needed to decide what to fetch, minus content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub title: String,
    pub description: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum_level: Option<CurriculumLevel>,
    pub score: f32,
}

/// Curriculum-aware ranking parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurriculumScope {
    /// Domain of the current task; `None` treats every item as same-domain.
    #[serde(default)]
    pub domain: Option<String>,

    /// Override the level classified from the query text.
    #[serde(default)]
    pub level: Option<CurriculumLevel>,
}

/// A query for searching memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_k")]
    pub k: usize,

    /// Only items carrying at least one of these tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Enables curriculum-aware reordering
    #[serde(default)]
    pub curriculum: Option<CurriculumScope>,
}

fn default_k() -> usize {
    5
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            k,
            tags: Vec::new(),
            curriculum: None,
        }
    }

    pub fn with_curriculum(mut self, scope: CurriculumScope) -> Self {
        self.curriculum = Some(scope);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (tests, ephemeral runs) and JSONL file.
/// Writes must tolerate concurrent upserts from independent workers.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Idempotent upsert keyed by content hash. Returns the id.
    async fn add(&self, item: MemoryItem) -> Result<String, MemoryError>;

    /// Ranked metadata; content is withheld. Empty is a valid result.
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryHit>, MemoryError>;

    /// Full records for `ids`. Fails with `BudgetExceeded` iff `ids.len() > max_n`.
    async fn get(&self, ids: &[String], max_n: usize) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Total record count.
    async fn count(&self) -> Result<usize, MemoryError>;

    /// Every record, sorted by id.
    async fn all(&self) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Append tags to an existing record.
    async fn add_tags(&self, id: &str, tags: &[String]) -> Result<(), MemoryError>;

    /// Bump the outcome counter of an existing record.
    async fn record_outcome(&self, id: &str, success: bool) -> Result<(), MemoryError>;
}
