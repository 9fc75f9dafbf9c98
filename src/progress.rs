//! Sync progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::models::RepoId;

/// A single progress event emitted by `kb sync`.
#[derive(Debug, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncProgressEvent<'a> {
    /// Walking the knowledge-base root. Total unknown.
    Discovering { root: &'a Path },
    /// Repository `n` of `total` finished. `status` is an
    /// [`IndexStatus`](crate::indexer::IndexStatus) name or `failed`.
    #[serde(rename = "indexing")]
    Indexed {
        repo: &'a RepoId,
        status: &'a str,
        n: usize,
        total: usize,
    },
}

pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: &SyncProgressEvent<'_>);
}

/// `[ 3/12] owner/name  updated`
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: &SyncProgressEvent<'_>) {
        let mut stderr = std::io::stderr().lock();
        let _ = match event {
            SyncProgressEvent::Discovering { root } => {
                writeln!(stderr, "scanning {} ...", root.display())
            }
            SyncProgressEvent::Indexed {
                repo,
                status,
                n,
                total,
            } => {
                let width = total.to_string().len();
                writeln!(stderr, "[{:>width$}/{}] {}  {}", n, total, repo, status)
            }
        };
    }
}

/// One JSON object per line: `{"event":"progress","phase":...}`.
pub struct JsonProgress;

#[derive(Serialize)]
struct ProgressLine<'e, 'a> {
    event: &'static str,
    #[serde(flatten)]
    body: &'e SyncProgressEvent<'a>,
}

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: &SyncProgressEvent<'_>) {
        let line = ProgressLine {
            event: "progress",
            body: event,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", json);
        }
    }
}

pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: &SyncProgressEvent<'_>) {}
}

/// `--progress` values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
