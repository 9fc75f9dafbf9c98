//! Knowledge-base statistics.
//!
//! Provides a quick summary of what's indexed: record counts, how many are
//! incomplete, and the most common tags and dependencies. Used by `kb stats`
//! to give confidence that syncs are working as expected.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;
use crate::models::RepositoryRecord;
use crate::store::IndexStore;

const TOP_N: usize = 10;

/// Aggregated counts over one store snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KbStats {
    pub records: usize,
    pub incomplete: usize,
    pub with_dependencies: usize,
    /// Most-used tags, count desc then name asc.
    pub top_tags: Vec<(String, usize)>,
    pub top_dependencies: Vec<(String, usize)>,
    pub last_indexed: Option<DateTime<Utc>>,
}

impl KbStats {
    pub fn collect(records: &[RepositoryRecord]) -> Self {
        let mut tags: BTreeMap<&str, usize> = BTreeMap::new();
        let mut deps: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records {
            for tag in &record.tags {
                *tags.entry(tag).or_default() += 1;
            }
            for dep in &record.dependencies {
                *deps.entry(&dep.name).or_default() += 1;
            }
        }
        Self {
            records: records.len(),
            incomplete: records.iter().filter(|r| r.incomplete).count(),
            with_dependencies: records.iter().filter(|r| !r.dependencies.is_empty()).count(),
            top_tags: top(tags),
            top_dependencies: top(deps),
            last_indexed: records.iter().map(|r| r.indexed_at).max(),
        }
    }
}

fn top(counts: BTreeMap<&str, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    // Stable sort keeps the BTreeMap's name order among equal counts.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(TOP_N);
    entries
}

/// Run the stats command: read a snapshot and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = db::connect(config)?;
    let stats = KbStats::collect(&store.list()?);

    println!("Repository Knowledge Base: Stats");
    println!("================================");
    println!();
    println!("  Root:        {}", config.kb.root.display());
    println!("  Store:       {}", store.root().display());
    println!();
    println!("  Records:     {}", stats.records);
    println!("  Incomplete:  {}", stats.incomplete);
    println!("  With deps:   {}", stats.with_dependencies);
    println!(
        "  Last index:  {}",
        stats
            .last_indexed
            .map(|ts| format_age(ts, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    );

    for (title, entries) in [("Top tags", &stats.top_tags), ("Top dependencies", &stats.top_dependencies)] {
        if entries.is_empty() {
            continue;
        }
        println!();
        println!("  {}:", title);
        for (name, count) in entries {
            println!("    {:<32} {:>5}", name, count);
        }
    }
    println!();
    Ok(())
}

/// "just now", "5 mins ago", "2 days ago"; absolute once older than 30 days
/// or when the clock is behind the record.
fn format_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(ts);
    let (n, unit) = if age < Duration::zero() || age >= Duration::days(30) {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    } else if age < Duration::minutes(1) {
        return "just now".to_string();
    } else if age < Duration::hours(1) {
        (age.num_minutes(), "min")
    } else if age < Duration::days(1) {
        (age.num_hours(), "hour")
    } else {
        (age.num_days(), "day")
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dependency;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(id: &str, tags: &[&str], deps: &[&str], incomplete: bool) -> RepositoryRecord {
        RepositoryRecord {
            version: crate::models::RECORD_VERSION,
            id: id.parse().unwrap(),
            local_path: PathBuf::new(),
            summary: String::new(),
            use_when: None,
            dependencies: deps.iter().map(|d| Dependency::new(d, "")).collect(),
            key_files: Vec::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            indexed_at: Utc::now(),
            source_hash: String::new(),
            incomplete,
            notes: Vec::new(),
        }
    }

    #[test]
    fn collects_counts_and_ranks() {
        let stats = KbStats::collect(&[
            record("a/a", &["nlp", "llm"], &["torch"], false),
            record("b/b", &["llm"], &[], true),
            record("c/c", &["cv"], &["torch", "numpy"], false),
        ]);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.incomplete, 1);
        assert_eq!(stats.with_dependencies, 2);
        assert_eq!(stats.top_tags[0], ("llm".to_string(), 2));
        assert_eq!(stats.top_tags[1], ("cv".to_string(), 1));
        assert_eq!(stats.top_dependencies[0], ("torch".to_string(), 2));
    }

    #[test]
    fn ages() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_age(now - Duration::hours(2), now), "2 hours ago");
        let old = now - Duration::days(45);
        assert_eq!(format_age(old, now), old.format("%Y-%m-%d %H:%M").to_string());
    }
}
