//! Metadata record builder.
//!
//! Combines README summary, manifest outcome, detected key files, and derived
//! tags into one [`RepositoryRecord`]. Building never fails: insufficient
//! inputs produce empty fields and set `incomplete`, with a note explaining
//! why.

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::manifest::ManifestOutcome;
use crate::models::{dedup_dependencies, KeyFile, RepoId, RepositoryRecord, RECORD_VERSION};
use crate::readme::{summarize, topic_markers};
use crate::tags::derive_tags;

/// Bounds applied while building a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSettings {
    pub max_summary_words: usize,
    pub max_tags: usize,
    pub max_key_files: usize,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            max_summary_words: 100,
            max_tags: 10,
            max_key_files: 10,
        }
    }
}

/// Everything the builder needs, already read from disk.
#[derive(Debug, Clone)]
pub struct RecordInputs<'a> {
    pub id: &'a RepoId,
    pub local_path: &'a Path,
    pub readme: Option<&'a str>,
    pub manifest: &'a ManifestOutcome,
    pub key_files: Vec<KeyFile>,
    pub source_hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// Build a record. Pure: performs no I/O.
pub fn build_record(inputs: RecordInputs<'_>, settings: &RecordSettings) -> RepositoryRecord {
    let mut notes = Vec::new();

    let summary = match inputs.readme {
        Some(text) => {
            let s = summarize(text, settings.max_summary_words);
            if s.summary.is_empty() {
                notes.push("README has no extractable summary".to_string());
            }
            s
        }
        None => {
            notes.push("no README found".to_string());
            Default::default()
        }
    };

    if let Some(note) = inputs.manifest.note() {
        notes.push(note);
    }

    let dependencies = dedup_dependencies(inputs.manifest.dependencies().to_vec());
    let topics = inputs.readme.map(topic_markers).unwrap_or_default();
    let tag_text = match &summary.use_when {
        Some(clause) => format!("{} {}", summary.summary, clause),
        None => summary.summary.clone(),
    };
    let tags = derive_tags(&dependencies, &tag_text, &topics, settings.max_tags);

    let mut key_files = inputs.key_files;
    key_files.truncate(settings.max_key_files);

    let incomplete = summary.summary.is_empty()
        || matches!(inputs.manifest, ManifestOutcome::ParseError { .. });

    RepositoryRecord {
        version: RECORD_VERSION,
        id: inputs.id.clone(),
        local_path: inputs.local_path.to_path_buf(),
        summary: summary.summary,
        use_when: summary.use_when,
        dependencies,
        key_files,
        tags,
        indexed_at: inputs.indexed_at,
        source_hash: inputs.source_hash,
        incomplete,
        notes,
    }
}
