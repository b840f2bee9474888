use super::directory::LoadDirectory;
use crate::cloner::TableCloner;
use crate::config::{LoadMetadata, TableConfig};
use crate::database::Database;
use crate::error::{LoadError, Result};
use load_core::{Bubble, BubbleNamer, TableDefinition, TableRef};
use regex::Regex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One LIVE table and where it goes in each bubble.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub config: TableConfig,
    pub live: TableRef,
    /// LIVE as discovered, audit columns included
    pub live_def: TableDefinition,
    pub ignore: Option<Regex>,
    pub raw: TableRef,
    pub raw_def: TableDefinition,
    pub staging: TableRef,
    pub staging_def: TableDefinition,
}

impl TablePlan {
    pub fn new(
        config: TableConfig,
        live_def: TableDefinition,
        ignore: Option<Regex>,
        cloner: &TableCloner<'_>,
    ) -> Self {
        let live = config.live_ref();
        let raw_def = cloner.clone_definition(&live_def, &config.discarded_columns, Bubble::Raw);
        let staging_def = cloner.clone_definition(&live_def, &[], Bubble::Staging);
        Self {
            raw: cloner.location(&live, Bubble::Raw),
            staging: cloner.location(&live, Bubble::Staging),
            config,
            live,
            live_def,
            ignore,
            raw_def,
            staging_def,
        }
    }

    /// LIVE table name, used in log lines and job records.
    pub fn name(&self) -> &str {
        &self.live.table
    }
}

/// Everything one job threads through its steps: connections, naming, the tables,
/// and the two cancellation channels.
pub struct JobContext {
    pub job_id: i64,
    pub load: Arc<LoadMetadata>,
    pub live: Arc<dyn Database>,
    /// Server holding RAW and STAGING; the LIVE server unless the recipe names another
    pub staging: Arc<dyn Database>,
    pub namer: Box<dyn BubbleNamer>,
    pub directory: LoadDirectory,
    pub tables: Vec<TablePlan>,
    /// RAW/STAGING databases earlier failed jobs of this load left under names a
    /// job-scoped namer no longer produces
    pub stale_bubbles: Vec<String>,
    /// Graceful stop, honoured between steps and between tables
    pub stop: CancellationToken,
    /// Hard abort, also honoured between rows
    pub abort: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_id: i64,
        load: Arc<LoadMetadata>,
        live: Arc<dyn Database>,
        staging: Arc<dyn Database>,
        stop: CancellationToken,
        abort: CancellationToken,
    ) -> Result<Self> {
        let namer = load.naming.namer(job_id)?;
        let directory = LoadDirectory::new(load.load_directory.clone());
        Ok(Self {
            job_id,
            load,
            live,
            staging,
            namer,
            directory,
            tables: Vec::new(),
            stale_bubbles: Vec::new(),
            stop,
            abort,
        })
    }

    /// Cloner for the RAW/STAGING server.
    pub fn cloner(&self) -> TableCloner<'_> {
        TableCloner::new(self.staging.as_ref(), self.namer.as_ref())
            .with_live_engine(self.live.dialect().engine())
    }

    /// Fail with [`LoadError::Cancelled`] once stop or abort has been requested.
    pub fn check_stop(&self) -> Result<()> {
        if self.stop.is_cancelled() || self.abort.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    pub fn root_databases(&self) -> Vec<String> {
        self.load.root_databases()
    }

    pub fn live_tables(&self) -> Vec<TableRef> {
        self.tables.iter().map(|t| t.live.clone()).collect()
    }

    /// The plan for a LIVE table name.
    pub fn table(&self, name: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.live.table.eq_ignore_ascii_case(name))
    }

    /// Names of the RAW/STAGING objects this job creates, for the job record. Each
    /// is a database, or a table when the namer reuses the location.
    pub fn bubble_names(&self) -> Vec<String> {
        let cloner = self.cloner();
        let mut names = Vec::new();
        for bubble in [Bubble::Raw, Bubble::Staging] {
            if self.namer.reuses_location(bubble) {
                names.extend(
                    self.load
                        .tables
                        .iter()
                        .map(|t| cloner.location(&t.live_ref(), bubble).to_string()),
                );
            } else {
                names.extend(
                    self.root_databases()
                        .iter()
                        .map(|root| self.namer.database_name(root, bubble)),
                );
            }
        }
        names
    }

    /// [`Self::bubble_names`] qualified with the RAW/STAGING server, as claimed in
    /// the execution log while the job runs.
    pub fn bubble_locations(&self) -> Vec<String> {
        let server = self.load.staging_connection().server();
        self.bubble_names()
            .into_iter()
            .map(|name| format!("{server}/{name}"))
            .collect()
    }
}
