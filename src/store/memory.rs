//! In-memory [`IndexStore`] implementation for tests and in-process callers.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`, so `list` is already in
//! identity order. Nothing is persisted.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::IndexStore;
use crate::error::KbResult;
use crate::models::{RepoId, RepositoryRecord};

/// In-memory store. Each `put` swaps the whole record under the write lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<RepoId, RepositoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for InMemoryStore {
    fn get(&self, id: &RepoId) -> KbResult<Option<RepositoryRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: &RepositoryRecord) -> KbResult<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> KbResult<Vec<RepositoryRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    fn delete(&self, id: &RepoId) -> KbResult<bool> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(id).is_some())
    }
}
