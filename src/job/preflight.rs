//! Checks run before a job mutates anything.

use super::context::{JobContext, TablePlan};
use crate::attach::LoadComponent;
use crate::checks::{CheckEvent, CheckNotifier, CheckResult};
use crate::database::Database;
use crate::error::{LoadError, Result};
use crate::trigger::{TriggerImplementer, TriggerStatus};
use load_core::{live_audit_columns, Bubble, TableDefinition};
use load_log::DataLoadJob;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Counts failures on their way to the real notifier.
struct Tally<'a> {
    inner: &'a dyn CheckNotifier,
    failures: AtomicUsize,
}

impl<'a> Tally<'a> {
    fn new(inner: &'a dyn CheckNotifier) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
        }
    }

    fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl CheckNotifier for Tally<'_> {
    fn on_check(&self, event: CheckEvent) -> bool {
        if event.result == CheckResult::Fail {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.on_check(event)
    }
}

/// Run every pre-flight check, filling `ctx.tables` with the tables that passed.
/// `history` is every job in the execution log, oldest first. Returns true when
/// nothing failed.
pub async fn run_checks(
    ctx: &mut JobContext,
    components: &[Box<dyn LoadComponent>],
    history: &[DataLoadJob],
    notifier: &dyn CheckNotifier,
) -> Result<bool> {
    let tally = Tally::new(notifier);

    if let Err(e) = ctx.load.validate() {
        tally.on_check(CheckEvent::fail(e.to_string()));
        return Ok(false);
    }
    tally.on_check(CheckEvent::success(format!("Recipe {} is valid", ctx.load.name)));

    if !check_servers(ctx, &tally).await {
        return Ok(false);
    }

    check_directory(ctx, &tally)?;

    let timeout = ctx.load.trigger_timeout()?;
    let mut plans = Vec::new();
    {
        let cloner = ctx.cloner();
        for config in &ctx.load.tables {
            let live = config.live_ref();
            let Some(definition) = check_live_table(ctx, &live, &tally).await else {
                continue;
            };
            let definition = check_special_columns(ctx.live.as_ref(), &live, definition, &tally).await;

            let trigger = TriggerImplementer::new(ctx.live.as_ref(), live.clone(), definition.clone());
            match trigger.get_trigger_status().await {
                Ok(TriggerStatus::TriggerPresentAndValid) => {
                    tally.on_check(CheckEvent::success(format!("Archive trigger on {live} is valid")));
                }
                Ok(status) => {
                    let event = CheckEvent::warning(format!(
                        "Archive trigger on {live}: {status}; it will be created before migrating into LIVE"
                    ))
                    .with_fix(format!("Create archive table and trigger on {live}"));
                    if tally.on_check(event) {
                        match trigger.create_trigger(timeout).await {
                            Ok(_) => {
                                tally.on_check(CheckEvent::success(format!("Created archive trigger on {live}")));
                            }
                            Err(e) => {
                                tally.on_check(CheckEvent::fail(format!(
                                    "Could not create archive trigger on {live}: {e}"
                                )));
                            }
                        }
                    }
                }
                Err(e) => {
                    tally.on_check(CheckEvent::fail(format!(
                        "Could not read archive trigger on {live}: {e}"
                    )));
                }
            }

            let staging_dialect = ctx.staging.dialect();
            let mut translatable = true;
            for column in definition.columns.iter().chain(&config.discarded_columns) {
                if let Err(e) = staging_dialect.translate_type(&column.column_type) {
                    tally.on_check(CheckEvent::fail(format!(
                        "Column {} of {live} cannot be created on {}: {e}",
                        column.name,
                        ctx.staging.describe()
                    )));
                    translatable = false;
                }
            }
            if translatable {
                tally.on_check(CheckEvent::success(format!(
                    "Every column of {live} translates to {}",
                    staging_dialect.engine()
                )));
            }

            let same_engine = ctx.live.dialect().engine() == staging_dialect.engine();
            for key in definition.primary_keys() {
                let in_live = ctx.live.dialect().collation(key.collation.as_deref());
                // STAGING is created with LIVE's collation names only on the same engine
                let in_staging = if same_engine {
                    staging_dialect.collation(key.collation.as_deref())
                } else {
                    staging_dialect.default_collation()
                };
                if in_live.agrees_on_case(&in_staging) {
                    continue;
                }
                let message = format!(
                    "Key column {} of {live} is case-{} in LIVE but case-{} in STAGING",
                    key.name,
                    sensitivity(in_live.case_sensitive),
                    sensitivity(in_staging.case_sensitive)
                );
                if ctx.load.allow_key_collation_mismatch {
                    tally.on_check(CheckEvent::warning(format!(
                        "{message}; allowed by allow_key_collation_mismatch"
                    )));
                } else {
                    tally.on_check(CheckEvent::fail(format!(
                        "{message}; set allow_key_collation_mismatch to load anyway"
                    )));
                }
            }

            let ignore = ctx.load.ignore_regex(config)?;
            plans.push(TablePlan::new(config.clone(), definition, ignore, &cloner));
        }
    }
    ctx.tables = plans;

    check_bubbles(ctx, history, &tally).await;

    for component in components {
        let before = tally.failures();
        if !component.check(ctx, &tally) && tally.failures() == before {
            tally.on_check(CheckEvent::fail(format!(
                "Load component {} failed its checks",
                component.name()
            )));
        }
    }

    debug!("Pre-flight checks finished with {} failure(s)", tally.failures());
    Ok(tally.failures() == 0)
}

fn sensitivity(case_sensitive: bool) -> &'static str {
    if case_sensitive {
        "sensitive"
    } else {
        "insensitive"
    }
}

async fn check_servers(ctx: &JobContext, tally: &Tally<'_>) -> bool {
    let mut ok = true;
    let staging = ctx.load.staging_connection();
    for (role, config) in [("LIVE", &ctx.load.live), ("RAW/STAGING", staging)] {
        if let Err(e @ LoadError::MissingCredentials(_)) = config.resolve_password() {
            tally.on_check(CheckEvent::fail(format!("{role} server: {e}")));
            ok = false;
        }
    }
    let servers: [(&str, &dyn Database); 2] =
        [("LIVE", ctx.live.as_ref()), ("RAW/STAGING", ctx.staging.as_ref())];
    for (role, db) in servers {
        match db.ping().await {
            Ok(()) => {
                tally.on_check(CheckEvent::success(format!("Connected to {role} server {}", db.describe())));
            }
            Err(e) => {
                tally.on_check(CheckEvent::fail(format!(
                    "Cannot connect to {role} server {}: {e}",
                    db.describe()
                )));
                ok = false;
            }
        }
    }
    ok
}

fn check_directory(ctx: &JobContext, tally: &Tally<'_>) -> Result<()> {
    let directory = &ctx.directory;
    let missing = directory.missing_folders();
    if missing.is_empty() {
        tally.on_check(CheckEvent::success(format!(
            "Load directory {} is in place",
            directory.root().display()
        )));
    } else {
        let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        let event = CheckEvent::fail(format!("Missing load folders: {}", names.join(", ")))
            .with_fix("Create the missing folders");
        if tally.on_check(event) {
            directory.create_folders()?;
            tally.on_check(CheckEvent::success("Created load folders"));
        }
    }

    if let Some(owner) = directory.lock_owner() {
        if owner != ctx.job_id.to_string() {
            tally.on_check(CheckEvent::fail(format!(
                "Load directory {} is locked by job {owner}",
                directory.root().display()
            )));
        }
    }
    Ok(())
}

async fn check_live_table(ctx: &JobContext, live: &load_core::TableRef, tally: &Tally<'_>) -> Option<TableDefinition> {
    match ctx.live.table_exists(live).await {
        Ok(true) => {}
        Ok(false) => {
            tally.on_check(CheckEvent::fail(format!("LIVE table {live} does not exist")));
            return None;
        }
        Err(e) => {
            tally.on_check(CheckEvent::fail(format!("Cannot look up LIVE table {live}: {e}")));
            return None;
        }
    }
    let definition = match ctx.live.describe_table(live).await {
        Ok(definition) => definition,
        Err(e) => {
            tally.on_check(CheckEvent::fail(format!("Cannot describe {live}: {e}")));
            return None;
        }
    };
    if definition.primary_keys().is_empty() {
        let e = LoadError::NoPrimaryKey {
            table: live.to_string(),
        };
        tally.on_check(CheckEvent::fail(e.to_string()));
        return None;
    }
    tally.on_check(CheckEvent::success(format!(
        "{live} has primary key ({})",
        definition.primary_key_names().join(", ")
    )));
    Some(definition)
}

/// DataLoadRunID and ValidFrom must exist on LIVE for rows to be stamped.
async fn check_special_columns(
    live_db: &dyn Database,
    live: &load_core::TableRef,
    definition: TableDefinition,
    tally: &Tally<'_>,
) -> TableDefinition {
    let missing: Vec<_> = live_audit_columns()
        .into_iter()
        .filter(|c| !definition.has_column(&c.name))
        .collect();
    if missing.is_empty() {
        tally.on_check(CheckEvent::success(format!("{live} has the special audit columns")));
        return definition;
    }
    let names: Vec<&str> = missing.iter().map(|c| c.name.as_str()).collect();
    let event = CheckEvent::fail(format!(
        "{live} lacks special column(s) {}",
        names.join(", ")
    ))
    .with_fix(format!("Add {} to {live}", names.join(", ")));
    if !tally.on_check(event) {
        return definition;
    }
    for column in &missing {
        if let Err(e) = live_db.add_column(live, column).await {
            tally.on_check(CheckEvent::fail(format!(
                "Could not add {} to {live}: {e}",
                column.name
            )));
            return definition;
        }
    }
    match live_db.describe_table(live).await {
        Ok(described) => {
            tally.on_check(CheckEvent::success(format!("Added {} to {live}", names.join(", "))));
            described
        }
        Err(e) => {
            tally.on_check(CheckEvent::fail(format!("Cannot describe {live}: {e}")));
            definition
        }
    }
}

async fn check_bubbles(ctx: &mut JobContext, history: &[DataLoadJob], tally: &Tally<'_>) {
    let server = ctx.load.staging_connection().server();
    let roots = ctx.root_databases();
    let tables = ctx.live_tables();
    {
        let cloner = ctx.cloner();
        for bubble in [Bubble::Raw, Bubble::Staging] {
            let found = match cloner.present(&roots, &tables, bubble).await {
                Ok(found) => found,
                Err(e) => {
                    tally.on_check(CheckEvent::fail(format!("Cannot inspect {bubble} location: {e}")));
                    continue;
                }
            };
            if found.is_empty() {
                tally.on_check(CheckEvent::success(format!("No leftover {bubble} tables")));
            }
            for name in found {
                let location = format!("{server}/{name}");
                let owner = history.iter().rev().find(|j| j.used_bubble(&location));
                match owner {
                    Some(job) if job.load_name != ctx.load.name => {
                        tally.on_check(CheckEvent::fail(format!(
                            "{bubble} {name} was last used by job {} of load {}; drop it or let that load finish before running {}",
                            job.job_id, job.load_name, ctx.load.name
                        )));
                    }
                    _ => {
                        tally.on_check(CheckEvent::warning(format!(
                            "{bubble} {name} from an earlier job is present and will be dropped"
                        )));
                    }
                }
            }
        }
    }

    let mine: Vec<&DataLoadJob> = history
        .iter()
        .filter(|j| j.load_name == ctx.load.name)
        .collect();
    if !ctx.namer.is_job_scoped() {
        // leftovers carry this job's names and were covered above
        if let Some(job) = mine.last().filter(|j| !j.contaminated.is_empty()) {
            tally.on_check(CheckEvent::warning(format!(
                "Job {} left {} contaminated; they will be dropped and recreated",
                job.job_id,
                job.contaminated.join(", ")
            )));
        }
        return;
    }

    let current = ctx.bubble_names();
    let mut stale: Vec<String> = Vec::new();
    for job in mine {
        for name in &job.contaminated {
            let known = current.iter().chain(stale.iter()).any(|n| n.eq_ignore_ascii_case(name));
            if known {
                continue;
            }
            match ctx.staging.database_exists(name).await {
                Ok(true) => {
                    tally.on_check(CheckEvent::warning(format!(
                        "Job {} left {name} contaminated; it will be dropped",
                        job.job_id
                    )));
                    stale.push(name.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    tally.on_check(CheckEvent::fail(format!("Cannot look up {name}: {e}")));
                }
            }
        }
    }
    ctx.stale_bubbles = stale;
}
