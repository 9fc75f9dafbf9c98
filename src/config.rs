//! TOML configuration.
//!
//! Every section is optional; missing keys take the defaults below. After
//! parsing, [`load_config`] applies the `REPO_KB_PATH` override, expands a
//! leading `~/`, and validates the result.
//!
//! ```toml
//! [kb]
//! root = "~/github-kb"
//!
//! [store]
//! path = "~/github-kb/.kb"
//! write_global_index = true
//!
//! [summary]
//! max_words = 100
//!
//! [tags]
//! max_tags = 10
//!
//! [key_files]
//! max_files = 10
//!
//! [retrieval]
//! tag_weight = 3.0
//! dependency_weight = 2.0
//! summary_weight = 1.0
//! final_limit = 10
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::query::ScoreWeights;
use crate::record::RecordSettings;

/// Environment variable that replaces `kb.root`.
pub const ROOT_ENV: &str = "REPO_KB_PATH";

/// Store directory name under the root when `store.path` is unset.
const DEFAULT_STORE_DIR: &str = ".kb";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub kb: KbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub key_files: KeyFilesConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Where cloned repositories live, as `<root>/<owner>/<name>`.
#[derive(Debug, Deserialize, Clone)]
pub struct KbConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("~/github-kb")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Defaults to `<kb.root>/.kb`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub write_global_index: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            write_global_index: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
        }
    }
}

fn default_max_words() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct TagsConfig {
    #[serde(default = "default_cap")]
    pub max_tags: usize,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            max_tags: default_cap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyFilesConfig {
    #[serde(default = "default_cap")]
    pub max_files: usize,
}

impl Default for KeyFilesConfig {
    fn default() -> Self {
        Self {
            max_files: default_cap(),
        }
    }
}

fn default_cap() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_tag_weight")]
    pub tag_weight: f64,
    #[serde(default = "default_dependency_weight")]
    pub dependency_weight: f64,
    #[serde(default = "default_summary_weight")]
    pub summary_weight: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            tag_weight: default_tag_weight(),
            dependency_weight: default_dependency_weight(),
            summary_weight: default_summary_weight(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_tag_weight() -> f64 {
    3.0
}
fn default_dependency_weight() -> f64 {
    2.0
}
fn default_summary_weight() -> f64 {
    1.0
}
fn default_final_limit() -> usize {
    10
}

impl Config {
    /// Built-in defaults, used when no config file exists. The environment
    /// override and `~/` expansion still apply.
    pub fn minimal() -> Self {
        Config::default().resolve(std::env::var_os(ROOT_ENV))
    }

    /// Resolved store directory.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.kb.root.join(DEFAULT_STORE_DIR))
    }

    pub fn record_settings(&self) -> RecordSettings {
        RecordSettings {
            max_summary_words: self.summary.max_words,
            max_tags: self.tags.max_tags,
            max_key_files: self.key_files.max_files,
        }
    }

    pub fn score_weights(&self) -> ScoreWeights {
        ScoreWeights {
            tag: self.retrieval.tag_weight,
            dependency: self.retrieval.dependency_weight,
            summary: self.retrieval.summary_weight,
        }
    }

    /// Apply the root override and expand `~/` in every path.
    fn resolve(mut self, root_override: Option<OsString>) -> Self {
        if let Some(root) = root_override.filter(|r| !r.is_empty()) {
            self.kb.root = PathBuf::from(root);
        }
        self.kb.root = expand_tilde(&self.kb.root);
        self.store.path = self.store.path.as_deref().map(expand_tilde);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.summary.max_words == 0 {
            bail!("summary.max_words must be > 0");
        }
        if self.tags.max_tags == 0 {
            bail!("tags.max_tags must be >= 1");
        }
        if self.key_files.max_files == 0 {
            bail!("key_files.max_files must be >= 1");
        }
        if self.retrieval.final_limit == 0 {
            bail!("retrieval.final_limit must be >= 1");
        }
        let r = &self.retrieval;
        if !(r.tag_weight > r.dependency_weight
            && r.dependency_weight > r.summary_weight
            && r.summary_weight > 0.0)
        {
            bail!(
                "retrieval weights must satisfy tag_weight > dependency_weight > summary_weight > 0 \
                 (got {} / {} / {})",
                r.tag_weight,
                r.dependency_weight,
                r.summary_weight
            );
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content, std::env::var_os(ROOT_ENV))
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Load `path` when given explicitly (it must exist), otherwise
/// `default_path` if present, otherwise [`Config::minimal`].
pub fn load_config_or_default(explicit: Option<&Path>, default_path: &Path) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None if default_path.is_file() => load_config(default_path),
        None => Ok(Config::minimal()),
    }
}

fn parse_config(content: &str, root_override: Option<OsString>) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    let config = config.resolve(root_override);
    config.validate()?;
    Ok(config)
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/") || s == "~" {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            return home.join(s.strip_prefix("~/").unwrap_or(""));
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("", Some(OsString::from("/data/kb"))).unwrap();
        assert_eq!(config.kb.root, PathBuf::from("/data/kb"));
        assert_eq!(config.store_path(), PathBuf::from("/data/kb/.kb"));
        assert!(config.store.write_global_index);
        assert_eq!(config.record_settings(), RecordSettings::default());
        assert_eq!(config.score_weights(), ScoreWeights::default());
        assert_eq!(config.retrieval.final_limit, 10);
    }

    #[test]
    fn env_override_replaces_root() {
        let toml = "[kb]\nroot = \"/from/file\"\n";
        assert_eq!(
            parse_config(toml, None).unwrap().kb.root,
            PathBuf::from("/from/file")
        );
        assert_eq!(
            parse_config(toml, Some(OsString::from("/from/env"))).unwrap().kb.root,
            PathBuf::from("/from/env")
        );
    }

    #[test]
    fn explicit_store_path_kept() {
        let toml = "[kb]\nroot = \"/r\"\n[store]\npath = \"/s\"\nwrite_global_index = false\n";
        let config = parse_config(toml, None).unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/s"));
        assert!(!config.store.write_global_index);
    }

    #[test]
    fn tilde_expands() {
        if let Some(home) = std::env::var_os("HOME") {
            let expanded = expand_tilde(Path::new("~/github-kb"));
            assert_eq!(expanded, PathBuf::from(home).join("github-kb"));
        }
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn rejects_bad_weights_and_limits() {
        let bad_order = "[retrieval]\ntag_weight = 1.0\ndependency_weight = 2.0\n";
        assert!(parse_config(bad_order, None).is_err());
        assert!(parse_config("[summary]\nmax_words = 0\n", None).is_err());
        assert!(parse_config("[tags]\nmax_tags = 0\n", None).is_err());
        assert!(parse_config("[retrieval]\nfinal_limit = 0\n", None).is_err());
    }

    #[test]
    fn missing_explicit_path_is_error_missing_default_is_not() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("kb.toml");
        assert!(load_config_or_default(Some(&missing), &missing).is_err());
        assert!(load_config_or_default(None, &missing).is_ok());
    }
}
