//! File-per-repository [`IndexStore`] backend.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//! ├── records/<owner>/<name>.json   one pretty-printed record per repository
//! ├── tmp/.<uuid>.json.tmp          in-flight writes, never read
//! └── index.json                    derived global index (optional)
//! ```
//!
//! Every write lands in `tmp/` first, is flushed with `sync_all`, and is then
//! renamed over the canonical path. `tmp/` and `records/` share a parent, so
//! the rename stays on one filesystem and readers see either the old file or
//! the new one. A writer that dies before the rename leaves only an orphan
//! in `tmp/`, which [`FileStore::open`] sweeps once it is old enough.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::IndexStore;
use crate::error::{KbError, KbResult};
use crate::export::GlobalIndex;
use crate::models::{RepoId, RepositoryRecord};

/// Orphaned temp files younger than this may still belong to a live writer.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

const RECORDS_DIR: &str = "records";
const TMP_DIR: &str = "tmp";
const INDEX_FILE: &str = "index.json";

/// Durable store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the store at `root` and sweep stale temp
    /// files left by aborted writes.
    pub fn open(root: impl Into<PathBuf>) -> KbResult<Self> {
        let store = Self { root: root.into() };
        for dir in [store.records_dir(), store.tmp_dir()] {
            fs::create_dir_all(&dir).map_err(|e| KbError::store(&dir, e))?;
        }
        store.sweep_temp();
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Default location of the derived global index.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Canonical file for `id`. Identity components are validated on
    /// construction, so the path never escapes `records/`.
    pub fn record_path(&self, id: &RepoId) -> PathBuf {
        self.records_dir()
            .join(id.owner())
            .join(format!("{}.json", id.name()))
    }

    /// Rebuild the global index from a fresh snapshot and publish it at
    /// [`index_path`](Self::index_path). Returns the number of records.
    pub fn write_global_index(&self) -> KbResult<usize> {
        self.write_global_index_to(&self.index_path())
    }

    /// Same as [`write_global_index`](Self::write_global_index), to an
    /// arbitrary destination.
    pub fn write_global_index_to(&self, dest: &Path) -> KbResult<usize> {
        let records = self.list()?;
        let index = GlobalIndex::build(&records);
        let mut bytes = serde_json::to_vec_pretty(&index)?;
        bytes.push(b'\n');

        // Keep the temp file next to the destination so rename never
        // crosses filesystems.
        let tmp_dir = if dest.starts_with(&self.root) {
            self.tmp_dir()
        } else {
            dest.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        write_atomic(&tmp_dir, dest, &bytes)?;
        Ok(records.len())
    }

    fn read_record(&self, path: &Path) -> KbResult<Option<RepositoryRecord>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KbError::store(path, e)),
        };
        let record: RepositoryRecord =
            serde_json::from_slice(&bytes).map_err(|e| KbError::CorruptRecord {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if self.record_path(&record.id) != path {
            return Err(KbError::CorruptRecord {
                path: path.to_path_buf(),
                reason: format!("record identity {} does not match its location", record.id),
            });
        }
        Ok(Some(record))
    }

    fn sweep_temp(&self) {
        let Ok(entries) = fs::read_dir(self.tmp_dir()) else {
            return;
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if !matches!(age, Some(age) if age >= STALE_TEMP_AGE) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed stale temp file"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale temp file"),
            }
        }
    }
}

impl IndexStore for FileStore {
    fn get(&self, id: &RepoId) -> KbResult<Option<RepositoryRecord>> {
        self.read_record(&self.record_path(id))
    }

    fn put(&self, record: &RepositoryRecord) -> KbResult<()> {
        let mut bytes = serde_json::to_vec_pretty(record)?;
        bytes.push(b'\n');
        write_atomic(&self.tmp_dir(), &self.record_path(&record.id), &bytes)
    }

    fn list(&self) -> KbResult<Vec<RepositoryRecord>> {
        let records_dir = self.records_dir();
        if let Err(e) = fs::metadata(&records_dir) {
            return match e.kind() {
                io::ErrorKind::NotFound => Ok(Vec::new()),
                _ => Err(KbError::store(&records_dir, e)),
            };
        }

        let mut records = Vec::new();
        let walker = WalkDir::new(&records_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // A directory vanishing mid-walk is a concurrent delete.
                    if e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound) {
                        continue;
                    }
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| records_dir.clone());
                    return Err(KbError::store(path, io::Error::from(e)));
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read_record(path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(KbError::CorruptRecord { path, reason }) => {
                    warn!(path = %path.display(), %reason, "skipping corrupt record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn delete(&self, id: &RepoId) -> KbResult<bool> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    fsync_dir(parent).ok();
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(KbError::store(path, e)),
        }
    }
}

/// Write `bytes` to `dest` via a uniquely named temp file in `tmp_dir`.
/// On any failure the temp file is removed and `dest` is untouched.
pub(crate) fn write_atomic(tmp_dir: &Path, dest: &Path, bytes: &[u8]) -> KbResult<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| KbError::store(parent, e))?;
    }
    fs::create_dir_all(tmp_dir).map_err(|e| KbError::store(tmp_dir, e))?;

    let tmp = tmp_dir.join(format!(".{}.json.tmp", Uuid::new_v4()));
    if let Err(e) = write_synced(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(KbError::store(tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(KbError::store(dest, e));
    }
    if let Some(parent) = dest.parent() {
        fsync_dir(parent).ok();
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dependency;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(owner: &str, name: &str) -> RepositoryRecord {
        RepositoryRecord {
            version: crate::models::RECORD_VERSION,
            id: RepoId::new(owner, name).unwrap(),
            local_path: PathBuf::from(format!("/kb/{}/{}", owner, name)),
            summary: "A test repository.".to_string(),
            use_when: None,
            dependencies: vec![Dependency::new("torch", "==2.0.0")],
            key_files: Vec::new(),
            tags: vec!["pytorch".to_string()],
            indexed_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            source_hash: "h".to_string(),
            incomplete: false,
            notes: Vec::new(),
        }
    }

    #[test]
    fn put_get_roundtrip_and_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let rec = record("o", "n");
        store.put(&rec).unwrap();
        assert!(dir.path().join("records/o/n.json").is_file());
        assert_eq!(store.get(&rec.id).unwrap(), Some(rec));
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn record_paths_stay_under_records_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for raw in ["o/n", "...x/.y", "a.b/c-d_e"] {
            let id: RepoId = raw.parse().unwrap();
            let path = store.record_path(&id);
            assert_eq!(path.parent(), Some(store.records_dir().join(id.owner()).as_path()));
        }

        // Identities that would escape are rejected at every entry point.
        assert!(serde_json::from_str::<RepoId>("\"../etc\"").is_err());
        assert!(RepoId::new("..", "passwd").is_err());

        let escaping = serde_json::to_string(&record("o", "n"))
            .unwrap()
            .replace("\"o/n\"", "\"../n\"");
        let path = store.records_dir().join("o/n.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, escaping).unwrap();
        assert!(matches!(
            store.get(&RepoId::new("o", "n").unwrap()),
            Err(KbError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn put_replaces_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut rec = record("o", "n");
        store.put(&rec).unwrap();
        rec.tags.clear();
        rec.summary = "Changed.".to_string();
        store.put(&rec).unwrap();
        assert_eq!(store.get(&rec.id).unwrap(), Some(rec));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn list_skips_corrupt_and_misplaced_records() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put(&record("a", "one")).unwrap();
        store.put(&record("b", "two")).unwrap();
        fs::write(dir.path().join("records/a/broken.json"), "{ not json").unwrap();
        let misplaced = serde_json::to_vec(&record("z", "z")).unwrap();
        fs::write(dir.path().join("records/b/elsewhere.json"), misplaced).unwrap();
        fs::write(dir.path().join("records/a/notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = store.list().unwrap().iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["a/one", "b/two"]);
        assert!(matches!(
            store.get(&RepoId::new("a", "broken").unwrap()),
            Err(KbError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn delete_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let rec = record("o", "n");
        store.put(&rec).unwrap();
        assert!(store.delete(&rec.id).unwrap());
        assert!(!store.delete(&rec.id).unwrap());
        assert_eq!(store.get(&rec.id).unwrap(), None);
    }

    #[test]
    fn open_sweeps_only_old_temp_files() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("tmp");
        fs::create_dir_all(&tmp).unwrap();
        let old = tmp.join("old.json");
        let fresh = tmp.join("fresh.json");
        fs::write(&old, "partial").unwrap();
        fs::write(&fresh, "partial").unwrap();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn global_index_written_atomically() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put(&record("o", "n")).unwrap();
        assert_eq!(store.write_global_index().unwrap(), 1);
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(store.index_path()).unwrap()).unwrap();
        assert_eq!(json["records"][0]["id"], "o/n");
        assert_eq!(json["tags"]["pytorch"][0], "o/n");
    }
}
