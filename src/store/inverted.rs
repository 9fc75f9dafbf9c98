//! Derived inverted index: tag → identities and dependency → identities.
//!
//! Always rebuilt from a store snapshot, never persisted, never consulted
//! as truth. [`IndexCache`] keeps the last build keyed by a fingerprint of
//! the snapshot it came from and hands it out again only when the next
//! snapshot has the same fingerprint, so a query can never see an index
//! that mixes two versions of a record.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::models::{RepoId, RepositoryRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvertedIndex {
    fingerprint: String,
    tags: BTreeMap<String, BTreeSet<RepoId>>,
    dependencies: BTreeMap<String, BTreeSet<RepoId>>,
}

impl InvertedIndex {
    pub fn build(records: &[RepositoryRecord]) -> Self {
        let mut index = Self {
            fingerprint: snapshot_fingerprint(records),
            ..Default::default()
        };
        for record in records {
            for tag in &record.tags {
                index
                    .tags
                    .entry(tag.clone())
                    .or_default()
                    .insert(record.id.clone());
            }
            for dep in &record.dependencies {
                index
                    .dependencies
                    .entry(dep.name.clone())
                    .or_default()
                    .insert(record.id.clone());
            }
        }
        index
    }

    pub fn with_tag(&self, tag: &str) -> Option<&BTreeSet<RepoId>> {
        self.tags.get(tag)
    }

    pub fn with_dependency(&self, name: &str) -> Option<&BTreeSet<RepoId>> {
        self.dependencies.get(name)
    }

    /// Identities carrying every tag in `tags` and every dependency in
    /// `deps` (AND). `None` when both lists are empty, meaning no filter.
    /// Inputs must already be normalized.
    pub fn filter(&self, tags: &[String], deps: &[String]) -> Option<BTreeSet<RepoId>> {
        let empty = BTreeSet::new();
        let postings = tags
            .iter()
            .map(|t| self.with_tag(t).unwrap_or(&empty))
            .chain(deps.iter().map(|d| self.with_dependency(d).unwrap_or(&empty)));

        let mut acc: Option<BTreeSet<RepoId>> = None;
        for set in postings {
            acc = Some(match acc {
                None => set.clone(),
                Some(prev) => prev.intersection(set).cloned().collect(),
            });
        }
        acc
    }
}

/// SHA-256 over every field the index is derived from, plus each record's
/// source hash and index time.
pub fn snapshot_fingerprint(records: &[RepositoryRecord]) -> String {
    fn field(hasher: &mut Sha256, value: &str) {
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    let mut hasher = Sha256::new();
    hasher.update((records.len() as u64).to_le_bytes());
    for record in records {
        field(&mut hasher, &record.id.to_string());
        field(&mut hasher, &record.source_hash);
        field(&mut hasher, &record.indexed_at.to_rfc3339());
        field(&mut hasher, &record.tags.join("\n"));
        let deps: Vec<&str> = record.dependencies.iter().map(|d| d.name.as_str()).collect();
        field(&mut hasher, &deps.join("\n"));
    }
    format!("{:x}", hasher.finalize())
}

/// Single-slot cache of the most recent [`InvertedIndex`].
#[derive(Debug, Default)]
pub struct IndexCache {
    slot: Mutex<Option<Arc<InvertedIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `records`, reusing the cached build when the snapshot
    /// fingerprint is unchanged.
    pub fn get_or_build(&self, records: &[RepositoryRecord]) -> Arc<InvertedIndex> {
        let fingerprint = snapshot_fingerprint(records);
        {
            let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(index) = slot.as_ref().filter(|i| i.fingerprint == fingerprint) {
                debug!(records = records.len(), "inverted index cache hit");
                return Arc::clone(index);
            }
        }

        // Built outside the lock; a racing builder for the same snapshot
        // produces an identical index.
        debug!(records = records.len(), "inverted index cache miss, rebuilding");
        let index = Arc::new(InvertedIndex::build(records));
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&index));
        index
    }
}
