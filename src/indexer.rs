//! Indexing orchestration.
//!
//! Coordinates one repository directory through the pipeline:
//! read inputs → fingerprint → (skip if current) → parse manifest →
//! build record → publish to the store. The source directory is only ever
//! read. Cancellation is checked between phases and always before publish,
//! so an aborted run leaves the store untouched.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{KbError, KbResult};
use crate::keyfiles::{detect_key_files, KeyFileMatcher};
use crate::manifest::{parse_manifests, read_manifests, ManifestFile, ManifestOutcome};
use crate::models::{RepoId, RepositoryRecord, RECORD_VERSION};
use crate::readme::{find_readme, Readme};
use crate::record::{build_record, RecordInputs, RecordSettings};
use crate::store::IndexStore;

/// Per-call indexing options.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Rebuild even when the stored fingerprint matches.
    pub force: bool,
    /// Set to `true` from any thread to abort before publish.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl IndexOptions {
    fn check_cancelled(&self) -> KbResult<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(KbError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// No record existed for this identity.
    Created,
    /// A record existed and was replaced.
    Updated,
    /// Fingerprint matched; the stored record was returned as-is.
    Unchanged,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Created => "created",
            IndexStatus::Updated => "updated",
            IndexStatus::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub record: RepositoryRecord,
    pub status: IndexStatus,
    /// Manifest result; `None` when nothing was rebuilt.
    pub manifest: Option<ManifestOutcome>,
}

/// Freshness of a stored record against the directory it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale,
    /// The recorded `local_path` no longer exists.
    Missing,
}

impl Staleness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Staleness::Fresh => "fresh",
            Staleness::Stale => "stale",
            Staleness::Missing => "missing",
        }
    }
}

/// The raw inputs a record is built from, read once into memory.
#[derive(Debug, Clone)]
pub struct SourceInputs {
    pub readme: Option<Readme>,
    /// Every present manifest, highest precedence first.
    pub manifests: Vec<ManifestFile>,
}

impl SourceInputs {
    pub fn read(dir: &Path) -> Self {
        Self {
            readme: find_readme(dir),
            manifests: read_manifests(dir),
        }
    }

    /// SHA-256 over the record schema version, the README, and every present
    /// manifest. Each field is length-prefixed.
    pub fn source_hash(&self) -> String {
        fn field(hasher: &mut Sha256, bytes: &[u8]) {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }

        let mut hasher = Sha256::new();
        hasher.update(RECORD_VERSION.to_le_bytes());
        match &self.readme {
            Some(readme) => {
                field(&mut hasher, readme.file_name.as_bytes());
                field(&mut hasher, readme.content.as_bytes());
            }
            None => field(&mut hasher, b""),
        }
        for manifest in &self.manifests {
            let name = manifest
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            field(&mut hasher, name.as_bytes());
            field(&mut hasher, manifest.content.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Builds and publishes records into one store.
pub struct Indexer<'s, S: IndexStore + ?Sized> {
    store: &'s S,
    settings: RecordSettings,
    matcher: KeyFileMatcher,
}

impl<'s, S: IndexStore + ?Sized> Indexer<'s, S> {
    pub fn new(store: &'s S, settings: RecordSettings) -> Result<Self> {
        Ok(Self {
            store,
            settings,
            matcher: KeyFileMatcher::new()?,
        })
    }

    /// Index `dir` under `id`. Returns the stored record unchanged when the
    /// fingerprint of the current inputs matches it, unless `opts.force`.
    pub fn index_repository(
        &self,
        dir: &Path,
        id: &RepoId,
        opts: &IndexOptions,
    ) -> KbResult<IndexOutcome> {
        opts.check_cancelled()?;
        let meta = fs::metadata(dir).map_err(|e| KbError::SourceUnreadable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if !meta.is_dir() {
            return Err(KbError::SourceUnreadable {
                path: dir.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        let inputs = SourceInputs::read(dir);
        let source_hash = inputs.source_hash();

        let existing = match self.store.get(id) {
            Ok(existing) => existing,
            Err(KbError::CorruptRecord { path, reason }) => {
                warn!(path = %path.display(), %reason, "replacing corrupt record");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(existing) = &existing {
            if !opts.force && existing.source_hash == source_hash {
                info!(repo = %id, "record is current");
                return Ok(IndexOutcome {
                    record: existing.clone(),
                    status: IndexStatus::Unchanged,
                    manifest: None,
                });
            }
        }

        opts.check_cancelled()?;
        let manifest = parse_manifests(&inputs.manifests);

        opts.check_cancelled()?;
        let key_files = detect_key_files(dir, &self.matcher, self.settings.max_key_files);
        let local_path = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let record = build_record(
            RecordInputs {
                id,
                local_path: &local_path,
                readme: inputs.readme.as_ref().map(|r| r.content.as_str()),
                manifest: &manifest,
                key_files,
                source_hash,
                indexed_at: Utc::now(),
            },
            &self.settings,
        );

        opts.check_cancelled()?;
        self.store.put(&record)?;

        let status = if existing.is_some() {
            IndexStatus::Updated
        } else {
            IndexStatus::Created
        };
        info!(
            repo = %id,
            status = status.as_str(),
            incomplete = record.incomplete,
            dependencies = record.dependencies.len(),
            tags = record.tags.len(),
            "indexed repository"
        );
        Ok(IndexOutcome {
            record,
            status,
            manifest: Some(manifest),
        })
    }
}

/// Compare a stored record against its source directory.
pub fn check_staleness(record: &RepositoryRecord) -> Staleness {
    if !record.local_path.is_dir() {
        return Staleness::Missing;
    }
    if SourceInputs::read(&record.local_path).source_hash() == record.source_hash {
        Staleness::Fresh
    } else {
        Staleness::Stale
    }
}

/// Find every `<root>/<owner>/<name>` directory, skipping hidden entries and
/// `exclude` (the store directory when it lives under the root). Entries
/// whose names cannot form a [`RepoId`] are skipped with a warning. Sorted
/// by identity.
pub fn discover_repositories(root: &Path, exclude: Option<&Path>) -> KbResult<Vec<(RepoId, PathBuf)>> {
    fs::read_dir(root).map_err(|e| KbError::SourceUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;
    let exclude = exclude.map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));

    // Owner directories (depth 1) must reach the filter; min_depth would skip it.
    let walker = WalkDir::new(root)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                return false;
            }
            match &exclude {
                Some(ex) => entry
                    .path()
                    .canonicalize()
                    .map(|p| &p != ex)
                    .unwrap_or(true),
                None => true,
            }
        });

    let mut repos = Vec::new();
    for entry in walker.flatten() {
        if entry.depth() != 2 || (!entry.file_type().is_dir() && !entry.path().is_dir()) {
            continue;
        }
        let owner = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = entry.file_name().to_string_lossy().into_owned();
        match RepoId::new(&owner, &name) {
            Ok(id) => repos.push((id, entry.into_path())),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping directory"),
        }
    }
    repos.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(repos)
}

/// Identity from the last two components of `dir` (`.../<owner>/<name>`).
pub fn identity_from_path(dir: &Path) -> KbResult<RepoId> {
    let absolute = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let mut parts = absolute
        .components()
        .rev()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    match (parts.next(), parts.next()) {
        (Some(name), Some(owner)) => RepoId::new(&owner, &name),
        _ => Err(KbError::InvalidIdentity(dir.display().to_string())),
    }
}
