//! Core data models used throughout the knowledge base.
//!
//! These types represent the repository identity, the dependency and key-file
//! entries, and the [`RepositoryRecord`] that flows from the indexer into the
//! store and out through the query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::KbError;

/// Schema version of [`RepositoryRecord`]. Folded into every source hash, so
/// bumping it marks every stored record stale.
pub const RECORD_VERSION: u32 = 1;

/// `owner/name` pair identifying one repository. Unique key within a store.
///
/// Only constructible through validation, so both components are always
/// single safe path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: &str, name: &str) -> Result<Self, KbError> {
        let name = name.strip_suffix(".git").unwrap_or(name);
        for part in [owner, name] {
            if !is_valid_component(part) {
                return Err(KbError::InvalidIdentity(format!("{}/{}", owner, name)));
            }
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a GitHub clone URL (`https://github.com/o/n(.git)` or
    /// `git@github.com:o/n(.git)`).
    pub fn from_url(url: &str) -> Result<Self, KbError> {
        let invalid = || KbError::InvalidIdentity(url.to_string());
        let idx = url.find("github.com").ok_or_else(invalid)?;
        let rest = &url[idx + "github.com".len()..];
        let rest = rest
            .strip_prefix('/')
            .or_else(|| rest.strip_prefix(':'))
            .ok_or_else(invalid)?;
        let mut parts = rest.trim_end_matches('/').splitn(3, '/');
        let owner = parts.next().ok_or_else(invalid)?;
        let name = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::new(owner, name)
    }
}

fn is_valid_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("github.com") {
            return Self::from_url(s);
        }
        match s.trim().split_once('/') {
            Some((owner, name)) => Self::new(owner, name),
            None => Err(KbError::InvalidIdentity(s.to_string())),
        }
    }
}

impl Serialize for RepoId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RepoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One `(package, version-constraint)` pair. `version` is empty when the
/// manifest left the package unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl Dependency {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: normalize_package_name(name),
            version: version.trim().to_string(),
        }
    }
}

/// A conventional entry point found in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    /// Relative path with `/` separators.
    pub path: String,
    pub description: String,
}

/// The structured metadata document produced for one indexed repository.
///
/// Replaced wholesale on re-index; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub version: u32,
    pub id: RepoId,
    /// Informational only; identity is never derived from it.
    pub local_path: PathBuf,
    /// Empty only when `incomplete` is set.
    pub summary: String,
    #[serde(default)]
    pub use_when: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub key_files: Vec<KeyFile>,
    pub tags: Vec<String>,
    pub indexed_at: DateTime<Utc>,
    pub source_hash: String,
    #[serde(default)]
    pub incomplete: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Lowercase, with `_` and `.` folded to `-` (PEP 503 style).
pub fn normalize_package_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        match c {
            '_' | '.' | '-' => {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
            c => out.extend(c.to_lowercase()),
        }
    }
    out.trim_matches('-').to_string()
}

/// Normalize a free-form topic into tag form: lowercase, words joined by `-`.
/// Returns `None` when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        } else {
            out.extend(c.to_lowercase());
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Deduplicate by normalized name (first occurrence wins) and sort by name.
pub fn dedup_dependencies(deps: Vec<Dependency>) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    let mut out: Vec<Dependency> = deps
        .into_iter()
        .filter(|d| !d.name.is_empty() && seen.insert(d.name.clone()))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
