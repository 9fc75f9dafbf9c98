//! Export the derived global index as JSON.
//!
//! `index.json` aggregates every record into one document with
//! `tag → identities` and `dependency → identities` lookup tables, for
//! tools that want the whole knowledge base in one read. It is rebuilt from
//! a store snapshot every time and never read back as truth.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{RepoId, RepositoryRecord};
use crate::store::FileStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalIndex {
    pub generated_at: DateTime<Utc>,
    pub records: Vec<IndexEntry>,
    pub tags: BTreeMap<String, Vec<RepoId>>,
    pub dependencies: BTreeMap<String, Vec<RepoId>>,
}

/// Condensed view of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: RepoId,
    pub summary: String,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub indexed_at: DateTime<Utc>,
    pub incomplete: bool,
}

impl GlobalIndex {
    /// Aggregate `records`. Identity lists follow the order of `records`,
    /// which is identity order for a store snapshot.
    pub fn build(records: &[RepositoryRecord]) -> Self {
        let mut tags: BTreeMap<String, Vec<RepoId>> = BTreeMap::new();
        let mut dependencies: BTreeMap<String, Vec<RepoId>> = BTreeMap::new();
        let mut entries = Vec::with_capacity(records.len());

        for record in records {
            for tag in &record.tags {
                tags.entry(tag.clone()).or_default().push(record.id.clone());
            }
            for dep in &record.dependencies {
                dependencies
                    .entry(dep.name.clone())
                    .or_default()
                    .push(record.id.clone());
            }
            entries.push(IndexEntry {
                id: record.id.clone(),
                summary: record.summary.clone(),
                tags: record.tags.clone(),
                dependencies: record.dependencies.iter().map(|d| d.name.clone()).collect(),
                indexed_at: record.indexed_at,
                incomplete: record.incomplete,
            });
        }

        Self {
            generated_at: Utc::now(),
            records: entries,
            tags,
            dependencies,
        }
    }
}

/// Write the global index to `output`, or to the store's `index.json`.
pub fn run_export(store: &FileStore, output: Option<&Path>) -> Result<()> {
    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| store.index_path());
    let count = store
        .write_global_index_to(&dest)
        .with_context(|| format!("failed to export index to {}", dest.display()))?;
    eprintln!("Exported {} records to {}", count, dest.display());
    Ok(())
}
