//! Typed errors for the knowledge-base library.
//!
//! Only conditions that abort a single call live here. Degraded-but-usable
//! outcomes (no manifest, a partially parsed manifest, an incomplete record,
//! an empty query result) are modelled as data on the returned values.

use std::path::PathBuf;

/// Errors surfaced by the store, indexer, and query engine.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// The I/O layer under the index store failed. Scoped to the call in flight.
    #[error("index store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The repository directory handed to the indexer cannot be read.
    #[error("cannot read repository at {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single record file could not be decoded.
    #[error("corrupt record {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// An `owner/name` pair that cannot name a record.
    #[error("invalid repository identity: {0}")]
    InvalidIdentity(String),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Indexing was aborted before the record was published.
    #[error("indexing cancelled before publish")]
    Cancelled,
}

impl KbError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KbError::StoreUnavailable {
            path: path.into(),
            source,
        }
    }
}

pub type KbResult<T> = std::result::Result<T, KbError>;
