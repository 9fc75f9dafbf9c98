//! Heuristic key-file detection.
//!
//! Scans the repository top level and its first-level subdirectories for
//! conventionally named entry points (training, demo, main, inference, ...).
//! Matching is case-insensitive on the file name. Absence of matches is the
//! normal outcome for many repositories.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::models::KeyFile;

const SCRIPT_EXT: &str = "{py,ipynb,sh,rs,go,js,ts,jl,r,lua,rb}";

/// Pattern classes in priority order. `{ext}` expands to [`SCRIPT_EXT`].
const KEY_FILE_CLASSES: &[(&[&str], &str)] = &[
    (&["main.{ext}", "__main__.py"], "main entry point"),
    (&["train.{ext}", "train_*.{ext}", "training.{ext}"], "training script"),
    (&["finetune*.{ext}", "fine_tune*.{ext}"], "fine-tuning script"),
    (&["demo.{ext}", "demo_*.{ext}"], "demo script"),
    (&["app.{ext}", "server.{ext}"], "application entry point"),
    (&["cli.{ext}", "run.{ext}", "run_*.{ext}"], "command-line entry point"),
    (
        &["inference.{ext}", "infer.{ext}", "predict.{ext}", "generate.{ext}"],
        "inference script",
    ),
    (&["eval.{ext}", "evaluate.{ext}", "eval_*.{ext}"], "evaluation script"),
    (&["setup.py"], "package setup"),
];

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "venv",
    "env",
    "__pycache__",
    "dist",
    "build",
    "site-packages",
];

/// Compiled key-file matcher.
pub struct KeyFileMatcher {
    set: GlobSet,
    /// Glob index → class index.
    class_of: Vec<usize>,
}

impl KeyFileMatcher {
    pub fn new() -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut class_of = Vec::new();
        for (class, (patterns, _)) in KEY_FILE_CLASSES.iter().enumerate() {
            for pattern in *patterns {
                let pattern = pattern.replace("{ext}", SCRIPT_EXT);
                builder.add(GlobBuilder::new(&pattern).case_insensitive(true).build()?);
                class_of.push(class);
            }
        }
        Ok(Self {
            set: builder.build()?,
            class_of,
        })
    }

    /// Description of the best class matching `file_name`, if any.
    pub fn classify(&self, file_name: &str) -> Option<&'static str> {
        self.set
            .matches(file_name)
            .into_iter()
            .map(|idx| self.class_of[idx])
            .min()
            .map(|class| KEY_FILE_CLASSES[class].1)
    }
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.iter().any(|d| d.eq_ignore_ascii_case(name))
}

/// Detect key files under `root`: top level first, then lexicographic,
/// capped at `max_files`.
pub fn detect_key_files(root: &Path, matcher: &KeyFileMatcher, max_files: usize) -> Vec<KeyFile> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir() && skip_dir(&entry.file_name().to_string_lossy()))
        });

    let mut found: Vec<(usize, String, &'static str)> = Vec::new();
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(description) = matcher.classify(&name) else {
            continue;
        };
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        found.push((entry.depth(), rel, description));
    }

    found.sort();
    found
        .into_iter()
        .take(max_files)
        .map(|(_, path, description)| KeyFile {
            path,
            description: description.to_string(),
        })
        .collect()
}
