//! Staged Load Library
//!
//! Moves externally supplied data into production tables in three steps. Rows are
//! loaded into a RAW copy of each LIVE table, migrated into a STAGING copy that enforces
//! LIVE's keys, and finally diffed into LIVE by primary key. A trigger on every LIVE
//! table keeps the prior version of each updated or deleted row in an `_Archive` table.
//!
//! # Features
//!
//! - Pre-flight checks that report problems and propose fixes before anything is touched
//! - Schema cloning across SQL Server, MySQL, PostgreSQL and Oracle type systems
//! - Archive trigger management with staleness detection
//! - Overwrite-by-diff migration with audit stamping (`DataLoadRunID`, `ValidFrom`)
//! - An execution log of every job, with RAW/STAGING retained for inspection on failure
//!
//! # CLI Usage
//!
//! ```bash
//! # Run the checks only
//! staged-load check --recipe clinical.yaml
//!
//! # Load everything waiting in Data/ForLoading
//! staged-load run --recipe clinical.yaml --log-dir /var/log/staged-load
//!
//! # Inspect the archive trigger of one table
//! staged-load trigger status --recipe clinical.yaml --table People
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

pub mod attach;
pub mod checks;
pub mod cloner;
pub mod config;
pub mod database;
pub mod error;
pub mod job;
pub mod migration;
pub mod testing;
pub mod trigger;

pub use checks::{CheckEvent, CheckNotifier, CheckResult, CollectingNotifier, TracingNotifier};
pub use config::LoadMetadata;
pub use database::Database;
pub use error::{ErrorKind, LoadError, Result};
pub use job::{DataLoadOrchestrator, JobState, RunReport};
pub use load_log::{ExitCode, FilesystemLogStore, LoadLogStore, MemoryLogStore};

#[derive(Parser, Clone, Debug)]
pub struct RecipeOpts {
    /// Load recipe (YAML, or TOML with a .toml extension)
    #[arg(long, env = "STAGED_LOAD_RECIPE")]
    pub recipe: PathBuf,

    /// Apply every fix the checks propose
    #[arg(long)]
    pub accept_fixes: bool,
}

impl RecipeOpts {
    /// Read the recipe; `--accept-fixes` overrides the recipe's own setting.
    pub fn load(&self) -> Result<LoadMetadata> {
        let mut load = LoadMetadata::from_file(&self.recipe)?;
        load.accept_fixes |= self.accept_fixes;
        Ok(load)
    }
}

/// Connect to the LIVE server and the server holding RAW/STAGING. When the recipe
/// names no separate staging server both handles are the same connection.
pub async fn connect_servers(load: &LoadMetadata) -> Result<(Arc<dyn Database>, Arc<dyn Database>)> {
    let live = database::connect(&load.live).await?;
    let staging = match &load.staging_server {
        Some(config) => database::connect(config).await?,
        None => Arc::clone(&live),
    };
    Ok((live, staging))
}
