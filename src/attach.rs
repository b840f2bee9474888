//! Load components: whatever fills RAW from the outside world.

mod csv;

use crate::checks::CheckNotifier;
use crate::config::{ComponentConfig, LoadMetadata};
use crate::database::Database;
use crate::error::Result;
use crate::job::JobContext;
use async_trait::async_trait;
use std::path::PathBuf;

pub use self::csv::CsvAttacher;

/// Populates RAW tables for a job.
#[async_trait]
pub trait LoadComponent: Send + Sync {
    fn name(&self) -> String;

    /// Validate configuration and inputs before anything is touched. Problems are
    /// reported to `notifier`; returns false if the component cannot run.
    fn check(&self, ctx: &JobContext, notifier: &dyn CheckNotifier) -> bool;

    /// True when there is something to load.
    fn has_new_data(&self, ctx: &JobContext) -> Result<bool>;

    /// Write into the RAW tables on `raw`, returning the number of rows written.
    async fn populate_raw(&self, raw: &dyn Database, ctx: &JobContext) -> Result<u64>;

    /// Files read by the last `populate_raw`, to be archived on success.
    fn consumed_files(&self) -> Vec<PathBuf>;
}

/// Build the components a recipe names.
pub fn build_components(load: &LoadMetadata) -> Vec<Box<dyn LoadComponent>> {
    load.components
        .iter()
        .map(|component| match component {
            ComponentConfig::Csv(config) => {
                Box::new(CsvAttacher::new(config.clone())) as Box<dyn LoadComponent>
            }
        })
        .collect()
}
