//! Library-level tests against a real on-disk store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use repo_kb::indexer::{IndexOptions, IndexStatus, Indexer};
use repo_kb::models::{Dependency, KeyFile, RepoId, RepositoryRecord, RECORD_VERSION};
use repo_kb::query::{QueryEngine, QueryRequest, ScoreWeights};
use repo_kb::record::RecordSettings;
use repo_kb::store::{FileStore, IndexStore};
use repo_kb::KbError;
use tempfile::TempDir;

fn write_repo(root: &Path, owner: &str, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(owner).join(name);
    fs::create_dir_all(&dir).unwrap();
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn sample_record(owner: &str, name: &str) -> RepositoryRecord {
    RepositoryRecord {
        version: RECORD_VERSION,
        id: RepoId::new(owner, name).unwrap(),
        local_path: PathBuf::from(format!("/kb/{}/{}", owner, name)),
        summary: format!("{} does something useful.", name),
        use_when: Some("you need something useful".to_string()),
        dependencies: vec![Dependency::new("numpy", ">=1.20"), Dependency::new("torch", "")],
        key_files: vec![KeyFile {
            path: "train.py".to_string(),
            description: "training script".to_string(),
        }],
        tags: vec!["deep-learning".to_string(), "pytorch".to_string()],
        indexed_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        source_hash: "abc123".to_string(),
        incomplete: false,
        notes: Vec::new(),
    }
}

fn query<'a>(text: &'a str) -> QueryRequest<'a> {
    QueryRequest {
        text,
        tags: &[],
        dependencies: &[],
        limit: 10,
    }
}

#[test]
fn reindex_of_unchanged_repo_is_byte_identical() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(
        kb.path(),
        "owner",
        "tool",
        &[
            ("README.md", "# Tool\n\nA command line tool for converting files quickly.\n"),
            ("pyproject.toml", "[project]\nname = \"tool\"\ndependencies = [\"click>=8\", \"rich\"]\n"),
        ],
    );
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let id = RepoId::new("owner", "tool").unwrap();

    let first = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();
    let bytes = fs::read(store.record_path(&id)).unwrap();
    let second = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();

    assert_eq!(first.status, IndexStatus::Created);
    assert_eq!(second.status, IndexStatus::Unchanged);
    assert_eq!(first.record.indexed_at, second.record.indexed_at);
    assert_eq!(bytes, fs::read(store.record_path(&id)).unwrap());
}

#[test]
fn changed_inputs_replace_record_wholesale() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(
        kb.path(),
        "owner",
        "lib",
        &[
            ("README.md", "A library for deep learning experiments on images."),
            ("requirements.txt", "torch==2.0.0\nnumpy\n"),
        ],
    );
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let id = RepoId::new("owner", "lib").unwrap();
    let before = indexer
        .index_repository(&dir, &id, &IndexOptions::default())
        .unwrap()
        .record;

    fs::write(dir.join("requirements.txt"), "jax\n").unwrap();
    let after = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();

    assert_eq!(after.status, IndexStatus::Updated);
    assert_ne!(before.source_hash, after.record.source_hash);
    let names: Vec<&str> = after.record.dependencies.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["jax"]);
    assert!(!after.record.tags.contains(&"pytorch".to_string()));
    assert_eq!(store.get(&id).unwrap(), Some(after.record));
}

#[test]
fn lower_precedence_manifest_change_marks_stale() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(
        kb.path(),
        "owner",
        "mixed",
        &[
            ("README.md", "Mixed language project with bindings."),
            ("requirements.txt", "numpy\n"),
            ("package.json", "{\"dependencies\": {\"react\": \"^18\"}}"),
        ],
    );
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let id = RepoId::new("owner", "mixed").unwrap();
    let first = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();
    // requirements.txt is authoritative: react is not merged in.
    assert_eq!(first.record.dependencies.len(), 1);

    fs::write(dir.join("package.json"), "{\"dependencies\": {\"vue\": \"^3\"}}").unwrap();
    let second = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();
    assert_eq!(second.status, IndexStatus::Updated);
}

#[test]
fn put_then_get_round_trips() {
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    let record = sample_record("Vision-CAIR", "MiniGPT-4");
    store.put(&record).unwrap();
    assert_eq!(store.get(&record.id).unwrap(), Some(record.clone()));

    let reopened = FileStore::open(store_dir.path()).unwrap();
    assert_eq!(reopened.get(&record.id).unwrap(), Some(record));
}

#[test]
fn query_for_tag_returns_every_record_with_it() {
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    for name in ["one", "two", "three"] {
        store.put(&sample_record("o", name)).unwrap();
    }
    let mut other = sample_record("x", "unrelated");
    other.tags = vec!["web".to_string()];
    other.dependencies.clear();
    other.summary = "Serves web pages.".to_string();
    store.put(&other).unwrap();

    let engine = QueryEngine::new(&store, ScoreWeights::default());
    let hits = engine.search(&query("pytorch")).unwrap();
    let ids: Vec<String> = hits.iter().map(|h| h.id.to_string()).collect();
    assert_eq!(ids, vec!["o/one", "o/three", "o/two"]);
    assert!(hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn corrupt_record_does_not_hide_others() {
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    store.put(&sample_record("a", "good")).unwrap();
    store.put(&sample_record("b", "fine")).unwrap();
    let broken = store.record_path(&RepoId::new("a", "broken").unwrap());
    fs::write(&broken, "{\"version\": 1, \"id\": ").unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);

    let engine = QueryEngine::new(&store, ScoreWeights::default());
    assert_eq!(engine.search(&query("pytorch")).unwrap().len(), 2);
}

#[test]
fn corrupt_record_is_rebuilt_on_index() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(kb.path(), "a", "broken", &[("README.md", "Recovered from a corrupt record file.")]);
    let store = FileStore::open(store_dir.path()).unwrap();
    let id = RepoId::new("a", "broken").unwrap();
    let path = store.record_path(&id);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "garbage").unwrap();

    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let outcome = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();
    assert_eq!(outcome.status, IndexStatus::Created);
    assert!(store.get(&id).unwrap().is_some());
}

#[test]
fn scenario_multimodal_repo_outranks_unrelated() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let vlm = write_repo(
        kb.path(),
        "Vision-CAIR",
        "MiniGPT-4",
        &[
            (
                "README.md",
                "# MiniGPT-4\n\nEnhancing vision-language understanding with a multimodal large language model.\n",
            ),
            ("requirements.txt", "torch==2.0.0\ntransformers==4.30.0\n"),
        ],
    );
    let unrelated = write_repo(
        kb.path(),
        "acme",
        "ledger",
        &[
            ("README.md", "# Ledger\n\nDouble-entry bookkeeping for small businesses.\n"),
            ("package.json", "{\"dependencies\": {\"express\": \"^4\"}}"),
        ],
    );
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let vlm_id = RepoId::new("Vision-CAIR", "MiniGPT-4").unwrap();
    let other_id = RepoId::new("acme", "ledger").unwrap();
    let record = indexer
        .index_repository(&vlm, &vlm_id, &IndexOptions::default())
        .unwrap()
        .record;
    indexer
        .index_repository(&unrelated, &other_id, &IndexOptions::default())
        .unwrap();

    assert!(record.tags.contains(&"vision-language-model".to_string()));
    assert!(record.tags.contains(&"multimodal".to_string()));
    let names: Vec<&str> = record.dependencies.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["torch", "transformers"]);

    let engine = QueryEngine::new(&store, ScoreWeights::default());
    let hits = engine.search(&query("multimodal")).unwrap();
    assert_eq!(hits[0].id, vlm_id);
    assert!(hits.iter().all(|h| h.id != other_id));
}

#[test]
fn scenario_bare_directory_yields_incomplete_record() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(kb.path(), "someone", "bare", &[("main.c", "int main(){}")]);
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let id = RepoId::new("someone", "bare").unwrap();

    let outcome = indexer.index_repository(&dir, &id, &IndexOptions::default()).unwrap();
    assert!(outcome.record.incomplete);
    assert!(outcome.record.summary.is_empty());
    assert!(outcome.record.dependencies.is_empty());
    assert_eq!(store.get(&id).unwrap(), Some(outcome.record));
}

#[test]
fn scenario_concurrent_puts_leave_complete_files() {
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    let a = sample_record("alpha", "one");
    let b = sample_record("beta", "two");

    thread::scope(|s| {
        s.spawn(|| store.put(&a).unwrap());
        s.spawn(|| store.put(&b).unwrap());
    });

    assert_eq!(store.get(&a.id).unwrap(), Some(a));
    assert_eq!(store.get(&b.id).unwrap(), Some(b));
    assert_eq!(fs::read_dir(store_dir.path().join("tmp")).unwrap().count(), 0);
}

#[test]
fn concurrent_readers_never_see_partial_records() {
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    let mut record = sample_record("busy", "repo");
    record.summary = "word ".repeat(2000);
    store.put(&record).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..50 {
                let mut next = record.clone();
                next.source_hash = format!("hash-{}", i);
                store.put(&next).unwrap();
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                let got = store.get(&record.id).unwrap().unwrap();
                assert_eq!(got.summary.len(), record.summary.len());
                assert_eq!(store.list().unwrap().len(), 1);
            }
        });
    });
}

#[test]
fn concurrent_indexing_of_different_repos() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let store = FileStore::open(store_dir.path()).unwrap();
    let dirs: Vec<(RepoId, PathBuf)> = (0..8)
        .map(|i| {
            let name = format!("repo{}", i);
            let dir = write_repo(
                kb.path(),
                "org",
                &name,
                &[("README.md", "A repository used for concurrency testing here.")],
            );
            (RepoId::new("org", &name).unwrap(), dir)
        })
        .collect();

    thread::scope(|s| {
        for (id, dir) in &dirs {
            let store = &store;
            s.spawn(move || {
                let indexer = Indexer::new(store, RecordSettings::default()).unwrap();
                indexer.index_repository(dir, id, &IndexOptions::default()).unwrap();
            });
        }
    });

    assert_eq!(store.list().unwrap().len(), 8);
}

#[test]
fn cancelled_index_leaves_store_untouched() {
    let kb = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let dir = write_repo(kb.path(), "o", "n", &[("README.md", "Something to index right now.")]);
    let store = FileStore::open(store_dir.path()).unwrap();
    let indexer = Indexer::new(&store, RecordSettings::default()).unwrap();
    let opts = IndexOptions {
        force: false,
        cancel: Some(Arc::new(AtomicBool::new(true))),
    };
    let err = indexer
        .index_repository(&dir, &RepoId::new("o", "n").unwrap(), &opts)
        .unwrap_err();
    assert!(matches!(err, KbError::Cancelled));
    assert!(store.list().unwrap().is_empty());
    assert_eq!(fs::read_dir(store_dir.path().join("tmp")).unwrap().count(), 0);
}
