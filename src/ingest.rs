//! Indexing commands.
//!
//! `kb index` runs the indexer on one directory; `kb sync` discovers every
//! `<root>/<owner>/<name>` clone and indexes each in turn. A failing
//! repository is reported and skipped; it never aborts the batch.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::indexer::{
    discover_repositories, identity_from_path, IndexOptions, IndexOutcome, IndexStatus, Indexer,
};
use crate::manifest::ManifestOutcome;
use crate::models::RepoId;
use crate::progress::{ProgressMode, SyncProgressEvent};

pub fn run_index(config: &Config, dir: &Path, repo: Option<&str>, force: bool) -> Result<()> {
    let id: RepoId = match repo {
        Some(repo) => repo.parse()?,
        None => identity_from_path(dir).with_context(|| {
            format!(
                "Cannot derive owner/name from {}; pass --repo owner/name",
                dir.display()
            )
        })?,
    };

    let store = db::connect(config)?;
    let indexer = Indexer::new(&store, config.record_settings())?;
    let opts = IndexOptions {
        force,
        ..Default::default()
    };
    let outcome = indexer
        .index_repository(dir, &id, &opts)
        .with_context(|| format!("Failed to index {}", id))?;

    if outcome.status != IndexStatus::Unchanged && config.store.write_global_index {
        store.write_global_index()?;
    }

    print_outcome(&outcome);
    println!("ok");
    Ok(())
}

fn print_outcome(outcome: &IndexOutcome) {
    let record = &outcome.record;
    println!("index {}", record.id);
    println!("  status: {}", outcome.status.as_str());
    if let Some(manifest) = &outcome.manifest {
        match manifest {
            ManifestOutcome::NoManifestFound => println!("  manifest: none"),
            ManifestOutcome::Parsed { format, path, .. }
            | ManifestOutcome::ParseError { format, path, .. } => {
                println!("  manifest: {} ({})", path.display(), format.label())
            }
        }
    }
    println!("  dependencies: {}", record.dependencies.len());
    println!("  key files: {}", record.key_files.len());
    println!("  tags: {}", record.tags.join(", "));
    if record.incomplete {
        println!("  incomplete: {}", record.notes.join("; "));
    }
}

pub fn run_sync(config: &Config, force: bool, progress: ProgressMode) -> Result<()> {
    let store = db::connect(config)?;
    let indexer = Indexer::new(&store, config.record_settings())?;
    let reporter = progress.reporter();

    let root = &config.kb.root;
    reporter.report(&SyncProgressEvent::Discovering {
        root: root.as_path(),
    });
    let repos = discover_repositories(root, Some(store.root()))
        .with_context(|| format!("Failed to scan knowledge base root {}", root.display()))?;

    let opts = IndexOptions {
        force,
        ..Default::default()
    };
    let total = repos.len();
    let (mut created, mut updated, mut unchanged) = (0u64, 0u64, 0u64);
    let mut failures: Vec<(RepoId, String)> = Vec::new();

    for (n, (id, dir)) in repos.iter().enumerate() {
        let status = match indexer.index_repository(dir, id, &opts) {
            Ok(outcome) => {
                match outcome.status {
                    IndexStatus::Created => created += 1,
                    IndexStatus::Updated => updated += 1,
                    IndexStatus::Unchanged => unchanged += 1,
                }
                outcome.status.as_str()
            }
            Err(e) => {
                tracing::warn!(repo = %id, error = %e, "indexing failed");
                failures.push((id.clone(), e.to_string()));
                "failed"
            }
        };
        reporter.report(&SyncProgressEvent::Indexed {
            repo: id,
            status,
            n: n + 1,
            total,
        });
    }

    if (created + updated > 0 || !store.index_path().exists()) && config.store.write_global_index {
        store.write_global_index()?;
    }

    println!("sync {}", root.display());
    println!("  discovered: {} repositories", total);
    println!("  created: {}", created);
    println!("  updated: {}", updated);
    println!("  unchanged: {}", unchanged);
    println!("  failed: {}", failures.len());
    for (id, error) in &failures {
        println!("    {}: {}", id, error);
    }
    println!("ok");
    Ok(())
}
