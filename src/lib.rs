//! # Repository Knowledge Base
//!
//! A local knowledge base over cloned source repositories. Each repository
//! under `<root>/<owner>/<name>` is indexed into a structured metadata record
//! (summary, dependency stack, tags, key-file pointers), and free-text
//! queries rank repositories by topic, dependency, or capability without
//! re-reading repository contents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │ Repository   │──▶│ Indexer              │──▶│ Index Store │
//! │ directory    │   │ Manifest + Record    │   │ file/record │
//! └──────────────┘   └──────────────────────┘   └──────┬──────┘
//!                                                      │
//!                                 ┌────────────────────┤
//!                                 ▼                    ▼
//!                          ┌─────────────┐      ┌────────────┐
//!                          │ Query Engine│      │ index.json │
//!                          │ (ranked)    │      │ (derived)  │
//!                          └─────────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb sync                              # index every clone under the root
//! kb index ~/github-kb/owner/name      # index one clone
//! kb search "multimodal" --explain
//! kb get owner/name --check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`manifest`] | Dependency manifest parsing |
//! | [`readme`] | README discovery and summary extraction |
//! | [`tags`] | Tag derivation |
//! | [`keyfiles`] | Key-file detection |
//! | [`record`] | Record builder |
//! | [`indexer`] | Indexing orchestration and staleness |
//! | [`store`] | Index store trait, backends, inverted index |
//! | [`query`] | Ranked retrieval |
//! | [`export`] | Derived global index |

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod get;
pub mod indexer;
pub mod ingest;
pub mod keyfiles;
pub mod manifest;
pub mod models;
pub mod progress;
pub mod query;
pub mod readme;
pub mod record;
pub mod search;
pub mod stats;
pub mod store;
pub mod tags;

pub use error::{KbError, KbResult};
