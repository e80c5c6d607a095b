//! CLI subcommand implementations.

pub mod compact;
pub mod report;
pub mod track;

use std::path::Path;

use anyhow::{Context, Result};
use gone_db::{DbError, LogStore};

use crate::Config;

/// Opens the store in `dir`. When a tracker already holds it, the error
/// carries `locked_hint` instead of the path.
fn open_store(dir: &Path, config: &Config, locked_hint: &'static str) -> Result<LogStore> {
    match LogStore::open(dir, config.store_options()) {
        Ok(store) => Ok(store),
        Err(err @ DbError::Locked(_)) => Err(err).context(locked_hint),
        Err(err) => Err(err).with_context(|| format!("failed to open store {}", dir.display())),
    }
}
