//! Record retrieval commands: `kb get`, `kb list`, `kb remove`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::indexer::{check_staleness, Staleness};
use crate::models::{RepoId, RepositoryRecord};
use crate::store::IndexStore;

pub fn run_get(config: &Config, repo: &str, check: bool) -> Result<()> {
    let id: RepoId = repo.parse()?;
    let store = db::connect(config)?;
    let Some(record) = store.get(&id)? else {
        bail!("no record for {}", id);
    };

    println!("--- Repository ---");
    println!("id:           {}", record.id);
    println!("path:         {}", record.local_path.display());
    println!("indexed_at:   {}", record.indexed_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!("source_hash:  {}", record.source_hash);
    if check {
        println!("freshness:    {}", check_staleness(&record).as_str());
    }
    if record.incomplete {
        println!("incomplete:   yes");
    }
    for note in &record.notes {
        println!("note:         {}", note);
    }
    println!("tags:         {}", record.tags.join(", "));
    println!();

    println!("--- Summary ---");
    if record.summary.is_empty() {
        println!("(none)");
    } else {
        println!("{}", record.summary);
    }
    if let Some(use_when) = &record.use_when {
        println!("Use when: {}", use_when);
    }
    println!();

    println!("--- Dependencies ({}) ---", record.dependencies.len());
    for dep in &record.dependencies {
        if dep.version.is_empty() {
            println!("{}", dep.name);
        } else {
            println!("{} {}", dep.name, dep.version);
        }
    }
    println!();

    println!("--- Key files ({}) ---", record.key_files.len());
    for file in &record.key_files {
        println!("{}  ({})", file.path, file.description);
    }
    Ok(())
}

fn markers(record: &RepositoryRecord, check: bool) -> String {
    let mut out = Vec::new();
    if record.incomplete {
        out.push("incomplete");
    }
    if check {
        match check_staleness(record) {
            Staleness::Fresh => {}
            other => out.push(other.as_str()),
        }
    }
    if out.is_empty() {
        String::new()
    } else {
        format!("  [{}]", out.join(", "))
    }
}

pub fn run_list(config: &Config, check: bool) -> Result<()> {
    let store = db::connect(config)?;
    let records = store.list()?;
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}{}  {}",
            record.id,
            markers(record, check),
            record.tags.join(", ")
        );
    }
    Ok(())
}

pub fn run_remove(config: &Config, repo: &str) -> Result<()> {
    let id: RepoId = repo.parse()?;
    let store = db::connect(config)?;
    if !store.delete(&id)? {
        bail!("no record for {}", id);
    }
    if config.store.write_global_index {
        store.write_global_index()?;
    }
    println!("removed {}", id);
    Ok(())
}
