//! # Repository Knowledge Base CLI (`kb`)
//!
//! Thin command-line front end over the `repo_kb` library: indexing,
//! search, record inspection, and the derived global index.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb index <dir>` | Index one repository directory |
//! | `kb sync` | Index every `<root>/<owner>/<name>` clone |
//! | `kb search "<query>"` | Ranked search over indexed repositories |
//! | `kb get <owner/name>` | Print one record |
//! | `kb list` | List all records |
//! | `kb remove <owner/name>` | Delete one record |
//! | `kb export-index` | Write the aggregated `index.json` |
//! | `kb stats` | Counts, top tags, and top dependencies |
//!
//! Diagnostics go to stderr via `tracing`; set `RUST_LOG=repo_kb=debug` for
//! more detail.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use repo_kb::config;
use repo_kb::progress::ProgressMode;
use repo_kb::{db, export, get, ingest, search, stats};

const DEFAULT_CONFIG: &str = "./config/kb.toml";

/// Repository knowledge base: index cloned repositories into structured
/// metadata records and search them by topic, dependency, or capability.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Repository knowledge base: index local clones and search them by topic or dependency",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kb.toml`; when that file does not exist,
    /// built-in defaults apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index one repository directory.
    ///
    /// Rebuilds the record only when the README or a manifest changed since
    /// the last index.
    Index {
        /// Repository directory.
        dir: PathBuf,

        /// Identity as `owner/name` or a GitHub URL. Defaults to the last
        /// two components of the directory path.
        #[arg(long)]
        repo: Option<String>,

        /// Rebuild even when the record is current.
        #[arg(long)]
        force: bool,
    },

    /// Index every `<root>/<owner>/<name>` directory under the configured root.
    Sync {
        /// Rebuild every record even when current.
        #[arg(long)]
        force: bool,

        /// Progress on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search indexed repositories.
    Search {
        /// Free-text query.
        query: String,

        /// Only repositories carrying this tag (repeatable, AND).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Only repositories depending on this package (repeatable, AND).
        #[arg(long = "dep")]
        deps: Vec<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the per-field score breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Print one record.
    Get {
        /// `owner/name`.
        repo: String,

        /// Report whether the record is stale against the directory on disk.
        #[arg(long)]
        check: bool,
    },

    /// List every record.
    List {
        /// Mark records whose source changed or disappeared.
        #[arg(long)]
        check: bool,
    },

    /// Delete one record. The repository directory is not touched.
    Remove {
        /// `owner/name`.
        repo: String,
    },

    /// Write the aggregated global index.
    ExportIndex {
        /// Output path. Defaults to `<store>/index.json`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show record counts and the most common tags and dependencies.
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repo_kb=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(cli.config.as_deref(), Path::new(DEFAULT_CONFIG))?;

    match cli.command {
        Commands::Index { dir, repo, force } => {
            ingest::run_index(&cfg, &dir, repo.as_deref(), force)?;
        }
        Commands::Sync { force, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, force, mode)?;
        }
        Commands::Search {
            query,
            tags,
            deps,
            limit,
            explain,
        } => {
            search::run_search(&cfg, &query, &tags, &deps, limit, explain)?;
        }
        Commands::Get { repo, check } => {
            get::run_get(&cfg, &repo, check)?;
        }
        Commands::List { check } => {
            get::run_list(&cfg, check)?;
        }
        Commands::Remove { repo } => {
            get::run_remove(&cfg, &repo)?;
        }
        Commands::ExportIndex { output } => {
            let store = db::connect(&cfg)?;
            export::run_export(&store, output.as_deref())?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
    }

    Ok(())
}
