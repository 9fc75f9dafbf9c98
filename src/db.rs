use anyhow::{Context, Result};

use crate::config::Config;
use crate::store::FileStore;

/// Open the configured record store, creating its directories if needed.
pub fn connect(config: &Config) -> Result<FileStore> {
    let path = config.store_path();
    FileStore::open(&path).with_context(|| format!("Failed to open index store at {}", path.display()))
}
