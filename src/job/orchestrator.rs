//! Drives one job through RAW, STAGING and LIVE.

use super::context::JobContext;
use super::preflight::run_checks;
use super::state::JobState;
use crate::attach::{build_components, LoadComponent};
use crate::checks::{CheckEvent, CheckNotifier};
use crate::config::{Disposal, LoadMetadata};
use crate::database::Database;
use crate::error::{ErrorKind, LoadError, Result};
use crate::migration::{MigrationColumnSet, MigrationOutcome, OverwriteStrategy};
use crate::trigger::TriggerImplementer;
use chrono::Utc;
use load_core::{Bubble, ColumnDefinition};
use load_log::{DataLoadJob, ExitCode, LoadLogStore, TableLoadInfo};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What a run did, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// `None` when checks failed before a job was opened
    pub job_id: Option<i64>,
    pub exit_code: ExitCode,
    pub state: JobState,
    pub tables: Vec<MigrationOutcome>,
    pub errors: Vec<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            job_id: None,
            exit_code: ExitCode::Error,
            state: JobState::NotStarted,
            tables: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn advance(&mut self, next: JobState) -> Result<()> {
        self.state = self.state.advance(next)?;
        info!("Job state: {}", self.state);
        Ok(())
    }
}

/// Runs a load recipe end to end.
pub struct DataLoadOrchestrator {
    load: Arc<LoadMetadata>,
    live: Arc<dyn Database>,
    staging: Arc<dyn Database>,
    log: Arc<dyn LoadLogStore>,
    components: Vec<Box<dyn LoadComponent>>,
}

impl DataLoadOrchestrator {
    /// `staging` holds RAW and STAGING; pass `live` again when the recipe has no
    /// separate staging server.
    pub fn new(
        load: LoadMetadata,
        live: Arc<dyn Database>,
        staging: Arc<dyn Database>,
        log: Arc<dyn LoadLogStore>,
    ) -> Self {
        let components = build_components(&load);
        Self {
            load: Arc::new(load),
            live,
            staging,
            log,
            components,
        }
    }

    /// Replace the components built from the recipe.
    pub fn with_components(mut self, components: Vec<Box<dyn LoadComponent>>) -> Self {
        self.components = components;
        self
    }

    pub fn load(&self) -> &LoadMetadata {
        &self.load
    }

    fn context(&self, job_id: i64, stop: CancellationToken, abort: CancellationToken) -> Result<JobContext> {
        JobContext::new(
            job_id,
            Arc::clone(&self.load),
            Arc::clone(&self.live),
            Arc::clone(&self.staging),
            stop,
            abort,
        )
    }

    async fn history(&self) -> Result<Vec<DataLoadJob>> {
        self.log.list_jobs().await.map_err(LoadError::Log)
    }

    /// Run the pre-flight checks only. Returns true when nothing failed.
    pub async fn check(&self, notifier: &dyn CheckNotifier) -> Result<bool> {
        let job_id = self.log.next_job_id().await.map_err(LoadError::Log)?;
        let mut ctx = self.context(job_id, CancellationToken::new(), CancellationToken::new())?;
        let history = self.history().await?;
        run_checks(&mut ctx, &self.components, &history, notifier).await
    }

    /// Run the job. `stop` is honoured between steps and tables, `abort` also between
    /// rows. Only an unusable naming section or a failing execution log is returned as
    /// `Err`; every other failure ends up in the report and the job record.
    ///
    /// Two locks are held while the job runs: the load directory's, and a claim in the
    /// execution log on every RAW/STAGING location, which keeps out loads sharing
    /// those locations through another recipe.
    pub async fn run(
        &self,
        notifier: &dyn CheckNotifier,
        stop: CancellationToken,
        abort: CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport::new();
        report.advance(JobState::ChecksRunning)?;

        let job_id = self.log.next_job_id().await.map_err(LoadError::Log)?;
        let mut ctx = self.context(job_id, stop, abort)?;

        let _lock = match ctx.directory.lock(job_id) {
            Ok(lock) => lock,
            Err(e) => {
                notifier.on_check(CheckEvent::fail(e.to_string()));
                report.errors.push(e.to_string());
                report.advance(JobState::ChecksFailed)?;
                return Ok(report);
            }
        };

        let locations = ctx.bubble_locations();
        if let Err(e) = self
            .log
            .claim_locations(job_id, &self.load.name, &locations)
            .await
        {
            let message = format!("Cannot claim RAW/STAGING: {e:#}");
            notifier.on_check(CheckEvent::fail(message.clone()));
            report.errors.push(message);
            report.advance(JobState::ChecksFailed)?;
            return Ok(report);
        }
        let result = self.run_claimed(&mut ctx, notifier, &mut report).await;
        if let Err(e) = self.log.release_locations(job_id, &self.load.name).await {
            warn!("Could not release the RAW/STAGING claims of job {job_id}: {e:#}");
        }
        result.map(|()| report)
    }

    async fn run_claimed(
        &self,
        ctx: &mut JobContext,
        notifier: &dyn CheckNotifier,
        report: &mut RunReport,
    ) -> Result<()> {
        let job_id = ctx.job_id;
        let history = self.history().await?;
        let passed = match run_checks(ctx, &self.components, &history, notifier).await {
            Ok(passed) => passed,
            Err(e) => {
                notifier.on_check(CheckEvent::fail(e.to_string()));
                report.errors.push(e.to_string());
                false
            }
        };
        if !passed {
            warn!("Pre-flight checks failed; nothing was changed");
            report.advance(JobState::ChecksFailed)?;
            return Ok(());
        }
        if ctx.check_stop().is_err() {
            report.advance(JobState::Cancelled)?;
            return Ok(());
        }

        self.log
            .open_job(job_id, &self.load.name)
            .await
            .map_err(LoadError::Log)?;
        self.log
            .record_bubbles(job_id, ctx.bubble_locations())
            .await
            .map_err(LoadError::Log)?;
        report.job_id = Some(job_id);
        info!("Opened job {job_id} for load {}", self.load.name);

        let ctx = &*ctx;
        match self.execute(ctx, report).await {
            Ok(exit_code) => {
                report.exit_code = exit_code;
                self.log
                    .close_job(job_id, exit_code, report.state.as_str(), Vec::new())
                    .await
                    .map_err(LoadError::Log)?;
                info!("Job {job_id} finished: {exit_code}");
            }
            Err(e) => {
                let terminal = if e.kind() == ErrorKind::Cancelled {
                    JobState::Cancelled
                } else {
                    JobState::Crashed
                };
                error!("Job {job_id} failed in state {}: {e}", report.state);
                report.advance(terminal)?;
                report.errors.push(e.to_string());
                self.log
                    .record_error(job_id, e.to_string())
                    .await
                    .map_err(LoadError::Log)?;
                let contaminated = self.leftovers(ctx).await;
                self.log
                    .close_job(job_id, ExitCode::Error, report.state.as_str(), contaminated)
                    .await
                    .map_err(LoadError::Log)?;
                report.exit_code = ExitCode::Error;
            }
        }
        Ok(())
    }

    /// Bubbles left behind by a failed job, dropping them first if the recipe says so.
    async fn leftovers(&self, ctx: &JobContext) -> Vec<String> {
        let cloner = ctx.cloner();
        let roots = ctx.root_databases();
        let tables = ctx.live_tables();
        let mut present = false;
        for bubble in [Bubble::Raw, Bubble::Staging] {
            // assume the worst if the server cannot tell us
            present |= cloner.any_present(&roots, &tables, bubble).await.unwrap_or(true);
        }
        if !present {
            return Vec::new();
        }
        if self.load.dispose.on_failure == Disposal::Drop {
            match self.dispose(ctx).await {
                Ok(()) => return Vec::new(),
                Err(e) => warn!("Could not drop RAW/STAGING after failure: {e}"),
            }
        }
        let names = ctx.bubble_names();
        warn!("Retaining {} for inspection", names.join(", "));
        names
    }

    async fn dispose(&self, ctx: &JobContext) -> Result<()> {
        let cloner = ctx.cloner();
        let roots = ctx.root_databases();
        let tables = ctx.live_tables();
        for bubble in [Bubble::Raw, Bubble::Staging] {
            cloner.dispose(&roots, &tables, bubble).await?;
        }
        for name in &ctx.stale_bubbles {
            if ctx.staging.database_exists(name).await? {
                info!("Dropping {name} left by an earlier job");
                ctx.staging.drop_database(name).await?;
            }
        }
        Ok(())
    }

    async fn create_bubble(&self, ctx: &JobContext, bubble: Bubble) -> Result<()> {
        let cloner = ctx.cloner();
        for root in ctx.root_databases() {
            cloner.ensure_database(&root, bubble).await?;
        }
        for plan in &ctx.tables {
            let discarded: &[ColumnDefinition] = if bubble == Bubble::Raw {
                plan.config.discarded_columns.as_slice()
            } else {
                &[]
            };
            cloner
                .clone_table(&plan.live, &plan.live_def, discarded, bubble)
                .await?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, report: &mut RunReport) -> Result<ExitCode> {
        let mut new_data = false;
        for component in &self.components {
            new_data |= component.has_new_data(ctx)?;
        }
        if !new_data {
            info!("No component has new data");
            report.advance(JobState::Completed)?;
            return Ok(ExitCode::OperationNotRequired);
        }

        ctx.check_stop()?;
        self.dispose(ctx).await?;
        self.create_bubble(ctx, Bubble::Raw).await?;
        report.advance(JobState::RawCreated)?;

        for component in &self.components {
            ctx.check_stop()?;
            let rows = component.populate_raw(ctx.staging.as_ref(), ctx).await?;
            info!("{} loaded {rows} rows", component.name());
        }
        report.advance(JobState::RawPopulated)?;

        ctx.check_stop()?;
        self.create_bubble(ctx, Bubble::Staging).await?;
        let to_staging = OverwriteStrategy::new(
            ctx.staging.as_ref(),
            ctx.staging.as_ref(),
            ctx.job_id,
            ctx.abort.clone(),
        )
        .with_retries(self.load.statement_retries);
        let mut failed = Vec::new();
        for plan in &ctx.tables {
            ctx.check_stop()?;
            let columns = MigrationColumnSet::resolve(&plan.raw_def, &plan.staging_def, None)?;
            let result = to_staging
                .migrate(
                    &columns,
                    &plan.raw,
                    &plan.staging,
                    &plan.staging_def,
                    Utc::now().naive_utc(),
                )
                .await;
            match result {
                Ok(outcome) if outcome.partial => return Err(LoadError::Cancelled),
                Ok(outcome) => info!(
                    "{} -> {}: {} rows staged",
                    plan.raw,
                    plan.staging,
                    outcome.inserts + outcome.updates + outcome.unchanged
                ),
                Err(e) => self.table_failed(ctx, plan.name(), e, &mut failed, report).await?,
            }
        }
        report.advance(JobState::MigratedToStaging)?;

        let timeout = self.load.trigger_timeout()?;
        let loadable: Vec<_> = ctx
            .tables
            .iter()
            .filter(|plan| !failed.iter().any(|name| name == plan.name()))
            .collect();
        for plan in &loadable {
            ctx.check_stop()?;
            TriggerImplementer::new(ctx.live.as_ref(), plan.live.clone(), plan.live_def.clone())
                .create_trigger(timeout)
                .await?;
        }

        let to_live = OverwriteStrategy::new(
            ctx.staging.as_ref(),
            ctx.live.as_ref(),
            ctx.job_id,
            ctx.abort.clone(),
        )
        .with_retries(self.load.statement_retries);
        for plan in &loadable {
            ctx.check_stop()?;
            let columns = MigrationColumnSet::resolve(&plan.staging_def, &plan.live_def, plan.ignore.as_ref())?;
            let result = to_live
                .migrate(
                    &columns,
                    &plan.staging,
                    &plan.live,
                    &plan.live_def,
                    Utc::now().naive_utc(),
                )
                .await;
            match result {
                Ok(outcome) => {
                    self.log
                        .record_table(
                            ctx.job_id,
                            TableLoadInfo {
                                table: outcome.table.clone(),
                                inserts: outcome.inserts,
                                updates: outcome.updates,
                                started: outcome.started,
                                finished: outcome.finished,
                            },
                        )
                        .await
                        .map_err(LoadError::Log)?;
                    let partial = outcome.partial;
                    report.tables.push(outcome);
                    if partial {
                        warn!("{} was only partly loaded and needs review", plan.live);
                        return Err(LoadError::Cancelled);
                    }
                }
                Err(e) => self.table_failed(ctx, plan.name(), e, &mut failed, report).await?,
            }
        }
        if !failed.is_empty() {
            return Err(LoadError::TablesFailed(failed));
        }
        report.advance(JobState::MigratedToLive)?;

        let consumed: Vec<_> = self
            .components
            .iter()
            .flat_map(|c| c.consumed_files())
            .collect();
        if !consumed.is_empty() {
            let folder = ctx
                .directory
                .archive_files(ctx.job_id, Utc::now().date_naive(), &consumed)?;
            info!("Archived {} file(s) to {}", consumed.len(), folder.display());
        }
        report.advance(JobState::Archived)?;

        if self.load.dispose.on_success == Disposal::Drop {
            self.dispose(ctx).await?;
        }
        report.advance(JobState::Completed)?;
        Ok(ExitCode::Success)
    }

    /// A data-shape failure fails only its table; anything else ends the job.
    async fn table_failed(
        &self,
        ctx: &JobContext,
        table: &str,
        e: LoadError,
        failed: &mut Vec<String>,
        report: &mut RunReport,
    ) -> Result<()> {
        if e.kind() != ErrorKind::DataShape {
            return Err(e);
        }
        warn!("Table {table} failed, continuing with the rest: {e}");
        report.errors.push(e.to_string());
        self.log
            .record_error(ctx.job_id, e.to_string())
            .await
            .map_err(LoadError::Log)?;
        failed.push(table.to_string());
        Ok(())
    }
}
