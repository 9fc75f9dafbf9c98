//! Storage abstraction for the knowledge base.
//!
//! The [`IndexStore`] trait is the only interface the indexer and the query
//! engine use to reach persisted records, so the backend (flat files,
//! in-memory, a future embedded database) can be swapped without touching
//! either of them.
//!
//! Implementations must be `Send + Sync`: several threads may index
//! different repositories while another one queries.
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`FileStore`] | [`fs`] | Durable, file-per-repository store |
//! | [`InMemoryStore`] | [`memory`] | Tests and in-process callers |
//!
//! The tag/dependency lookup tables used by queries live in [`inverted`];
//! they are derived from [`IndexStore::list`] snapshots, never stored.

pub mod fs;
pub mod inverted;
pub mod memory;

pub use fs::FileStore;
pub use inverted::{IndexCache, InvertedIndex};
pub use memory::InMemoryStore;

use crate::error::KbResult;
use crate::models::{RepoId, RepositoryRecord};

/// Durable `identity → record` mapping.
///
/// # Consistency
///
/// - `put` replaces any existing record wholesale and is atomic with respect
///   to concurrent readers.
/// - A `get`, `list`, or query issued after `put` returns on the same store
///   observes the new record.
/// - `list` returns an owned snapshot sorted by identity.
pub trait IndexStore: Send + Sync {
    /// Fetch one record. `Ok(None)` when no record exists.
    fn get(&self, id: &RepoId) -> KbResult<Option<RepositoryRecord>>;

    /// Insert or replace the record for `record.id`.
    fn put(&self, record: &RepositoryRecord) -> KbResult<()>;

    /// Snapshot of every readable record, sorted by identity. Unreadable
    /// records are skipped with a warning.
    fn list(&self) -> KbResult<Vec<RepositoryRecord>>;

    /// Remove a record. Returns whether one existed.
    fn delete(&self, id: &RepoId) -> KbResult<bool>;
}
