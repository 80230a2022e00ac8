//! `procmem memory`: memory store commands.

use procmem_config::AppConfig;
use procmem_core::memory::{
    CurriculumLevel, CurriculumScope, MemoryItem, MemoryQuery, MemoryStore, Provenance, SourceType,
};
use procmem_memory::{classify, merge_packs, read_pack, write_pack};
use procmem_tools::render_item;
use std::collections::BTreeMap;
use std::path::Path;

use super::open_store;

/// Arguments of `memory add`.
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
    pub level: Option<u8>,
    pub domain: Option<String>,
}

impl NewItem {
    fn into_item(self) -> Result<MemoryItem, String> {
        let source: SourceType = self.source.parse()?;
        let level = match self.level {
            Some(l) => CurriculumLevel::new(l)
                .ok_or_else(|| format!("curriculum level must be 1-5, got {l}"))?,
            None => classify(&format!("{} {}", self.title, self.description)),
        };
        let mut item = MemoryItem::new(self.title, self.description, self.content, source)
            .with_tags(self.tags)
            .with_level(level)
            .with_provenance(Provenance::new("cli"));
        if let Some(domain) = self.domain {
            item = item.with_domain(domain);
        }
        Ok(item)
    }
}

pub async fn add(config: &AppConfig, draft: NewItem) -> Result<(), Box<dyn std::error::Error>> {
    let item = draft.into_item()?;
    let store = open_store(config)?;
    let before = store.count().await?;
    let id = store.add(item).await?;

    if store.count().await? > before {
        println!("✅ Added procedure {id}");
    } else {
        println!("  Procedure {id} already stored; tags merged.");
    }
    Ok(())
}

pub async fn search(
    config: &AppConfig,
    query: &str,
    k: Option<usize>,
    curriculum: bool,
    domain: Option<String>,
    tags: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let mut q = MemoryQuery::new(query, k.unwrap_or(config.memory.search_k)).with_tags(tags);
    if curriculum || config.memory.curriculum {
        q = q.with_curriculum(CurriculumScope {
            domain,
            level: None,
        });
    }

    let hits = store.search(&q).await?;
    if hits.is_empty() {
        println!("   No procedures found for \"{query}\".");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let level = hit
            .curriculum_level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "--".into());
        println!(
            "  {:>2}. [{}] {level} {:.3}  {} ({})",
            i + 1,
            hit.id,
            hit.score,
            hit.title,
            hit.source_type
        );
        if !hit.description.is_empty() {
            println!("      {}", hit.description);
        }
    }
    Ok(())
}

pub async fn show(config: &AppConfig, ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let items = store.get(ids, config.memory.max_get).await?;
    let blocks: Vec<String> = items.iter().map(render_item).collect();
    println!("{}", blocks.join("\n\n"));
    Ok(())
}

/// Counts by source type, level and domain.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct StoreStats {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_level: BTreeMap<String, usize>,
    pub by_domain: BTreeMap<String, usize>,
    pub successes: u64,
    pub failures: u64,
}

impl StoreStats {
    pub fn from_items(items: &[MemoryItem]) -> Self {
        let mut stats = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            *stats.by_source.entry(item.source_type.to_string()).or_default() += 1;
            let level = item
                .curriculum_level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unleveled".into());
            *stats.by_level.entry(level).or_default() += 1;
            let domain = item.domain.clone().unwrap_or_else(|| "(none)".into());
            *stats.by_domain.entry(domain).or_default() += 1;
            stats.successes += u64::from(item.success_count);
            stats.failures += u64::from(item.failure_count);
        }
        stats
    }
}

pub async fn stats(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let stats = StoreStats::from_items(&store.all().await?);

    println!("🧠 Memory Statistics");
    println!("====================");
    println!("  File:       {}", store.path().display());
    println!("  Procedures: {}", stats.total);
    println!("  Outcomes:   {} success / {} failure", stats.successes, stats.failures);
    for (title, counts) in [
        ("Source", &stats.by_source),
        ("Level", &stats.by_level),
        ("Domain", &stats.by_domain),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!("  {title}:");
        for (key, n) in counts {
            println!("    {key:<16} {n}");
        }
    }
    Ok(())
}

pub async fn export(config: &AppConfig, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let items = store.all().await?;
    write_pack(output, &items)?;
    println!("📤 Exported {} procedures to {}", items.len(), output.display());
    Ok(())
}

/// Merge a pack into the configured memory file. Tags are unioned and
/// outcome counters keep the larger value.
pub async fn import(config: &AppConfig, pack: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let incoming = read_pack(pack)?;
    let store = open_store(config)?;
    let base = store.all().await?;
    let before = base.len();
    let merged = merge_packs(base, incoming);
    write_pack(store.path(), &merged)?;
    println!(
        "📥 Imported {}: {} new, {} total",
        pack.display(),
        merged.len() - before,
        merged.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.memory.path = Some(dir.join("memory.jsonl"));
        config
    }

    fn draft(title: &str) -> NewItem {
        NewItem {
            title: title.into(),
            description: "count things per group".into(),
            content: "GROUP BY ?g".into(),
            source: "human".into(),
            tags: vec!["aggregate".into()],
            level: None,
            domain: Some("uniprot".into()),
        }
    }

    #[test]
    fn new_item_classifies_when_level_is_missing() {
        let item = draft("How many proteins per organism").into_item().unwrap();
        assert_eq!(item.curriculum_level.map(|l| l.get()), Some(3));
        assert_eq!(item.source_type, SourceType::Human);
    }

    #[test]
    fn new_item_rejects_bad_level_and_source() {
        let mut bad = draft("x");
        bad.level = Some(9);
        assert!(bad.into_item().is_err());

        let mut bad = draft("x");
        bad.source = "oracle".into();
        assert!(bad.into_item().is_err());
    }

    #[tokio::test]
    async fn add_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        add(&config, draft("Count proteins")).await.unwrap();
        add(&config, draft("Count proteins")).await.unwrap();
        add(&config, draft("List organisms")).await.unwrap();

        let pack = dir.path().join("out.jsonl");
        export(&config, &pack).await.unwrap();
        assert_eq!(read_pack(&pack).unwrap().len(), 2);

        let other = config_in(&dir.path().join("other"));
        import(&other, &pack).await.unwrap();
        import(&other, &pack).await.unwrap();
        let store = open_store(&other).unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn stats_group_by_source_and_domain() {
        let items = vec![
            draft("a").into_item().unwrap(),
            MemoryItem::new("b", "d", "c", SourceType::Failure),
        ];
        let stats = StoreStats::from_items(&items);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_source.get("failure"), Some(&1));
        assert_eq!(stats.by_domain.get("(none)"), Some(&1));
        assert_eq!(stats.by_domain.get("uniprot"), Some(&1));
    }
}
