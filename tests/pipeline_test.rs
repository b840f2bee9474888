//! Whole-job tests against the in-memory server.

use load_core::{
    ColumnDefinition, Engine, TableDefinition, TableRef, UniversalType, UniversalValue,
    ARCHIVE_STATUS, DATA_LOAD_RUN_ID,
};
use staged_load::config::{Disposal, NamingConvention};
use staged_load::job::LoadDirectory;
use staged_load::testing::{
    create_live_table, people_definition, people_recipe, people_ref, put_person, write_for_loading,
    MemoryDatabase, MemoryOp,
};
use staged_load::{
    CheckResult, CollectingNotifier, DataLoadOrchestrator, Database, ExitCode, JobState,
    LoadLogStore, LoadMetadata, MemoryLogStore,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PEOPLE_CSV: &str = "Name,Age,Postcode\nDave,30,AB1 2CD\nFrank,40,\n";

struct Harness {
    dir: TempDir,
    db: Arc<MemoryDatabase>,
    log: Arc<MemoryLogStore>,
    load: LoadMetadata,
}

impl Harness {
    async fn new(definition: TableDefinition) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MemoryDatabase::new(Engine::MicrosoftSqlServer));
        create_live_table(db.as_ref(), &definition).await.unwrap();
        LoadDirectory::new(dir.path()).create_folders().unwrap();
        let mut load = people_recipe(dir.path()).unwrap();
        load.accept_fixes = true;
        Self {
            dir,
            db,
            log: Arc::new(MemoryLogStore::new()),
            load,
        }
    }

    fn orchestrator(&self) -> DataLoadOrchestrator {
        let db: Arc<dyn Database> = self.db.clone();
        DataLoadOrchestrator::new(self.load.clone(), db.clone(), db, self.log.clone())
    }

    fn archive_ref(&self) -> TableRef {
        people_ref().with_table("People_Archive")
    }

    fn person(&self, name: &str) -> Option<load_core::Row> {
        self.db
            .rows(&people_ref())
            .into_iter()
            .find(|r| r.get("Name") == Some(&UniversalValue::Text(name.to_string())))
    }

    fn waiting_files(&self) -> usize {
        std::fs::read_dir(self.dir.path().join("Data").join("ForLoading"))
            .unwrap()
            .count()
    }
}

fn text(s: &str) -> UniversalValue {
    UniversalValue::Text(s.to_string())
}

#[tokio::test]
async fn test_full_load_updates_inserts_and_archives() {
    let h = Harness::new(people_definition()).await;
    put_person(h.db.as_ref(), &people_ref(), "Dave", 30, Some("ZZ9 9ZZ"))
        .await
        .unwrap();
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.exit_code, ExitCode::Success, "{:?}", report.errors);
    assert_eq!(report.state, JobState::Completed);
    let job_id = report.job_id.unwrap();
    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].inserts, 1);
    assert_eq!(report.tables[0].updates, 1);

    let dave = h.person("Dave").unwrap();
    assert_eq!(dave.get("Postcode"), Some(&text("AB1 2CD")));
    assert_eq!(dave.get(DATA_LOAD_RUN_ID), Some(&UniversalValue::Int(job_id)));
    let frank = h.person("Frank").unwrap();
    assert_eq!(frank.get("Postcode"), Some(&UniversalValue::Null));
    assert_eq!(frank.get("Age"), Some(&UniversalValue::Int(40)));

    // the prior version of Dave went to the archive
    let archived = h.db.rows(&h.archive_ref());
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].get("Postcode"), Some(&text("ZZ9 9ZZ")));
    assert_eq!(archived[0].get(ARCHIVE_STATUS), Some(&text("U")));

    // RAW and STAGING were dropped, the file archived and the lock released
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);
    assert_eq!(h.waiting_files(), 0);
    let archive_folder = h
        .dir
        .path()
        .join("Data")
        .join("ForArchiving")
        .join(format!("{}_job{job_id}", chrono::Utc::now().format("%Y-%m-%d")));
    assert!(archive_folder.join("People.csv").is_file());
    assert!(!LoadDirectory::new(h.dir.path()).lock_path().exists());

    let job = h.log.read_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.exit_code, Some(ExitCode::Success));
    assert_eq!(job.state.as_deref(), Some("completed"));
    assert_eq!(job.total_inserts(), 1);
    assert_eq!(job.total_updates(), 1);
    assert!(job.contaminated.is_empty());
}

#[tokio::test]
async fn test_nothing_to_load() {
    let h = Harness::new(people_definition()).await;

    let report = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.exit_code, ExitCode::OperationNotRequired);
    assert_eq!(report.exit_code.process_code(), 2);
    assert_eq!(report.state, JobState::Completed);
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);
    let job = h.log.read_job(report.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.exit_code, Some(ExitCode::OperationNotRequired));
}

#[tokio::test]
async fn test_reloading_the_same_file_changes_nothing() {
    let h = Harness::new(people_definition()).await;
    let orchestrator = h.orchestrator();
    let notifier = CollectingNotifier::new(true);

    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let first = orchestrator
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.exit_code, ExitCode::Success);
    assert_eq!(first.tables[0].inserts, 2);

    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let second = orchestrator
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.exit_code, ExitCode::Success);
    assert_eq!(second.job_id, first.job_id.map(|id| id + 1));
    assert_eq!(second.tables[0].inserts, 0);
    assert_eq!(second.tables[0].updates, 0);
    assert_eq!(second.tables[0].unchanged, 2);

    assert_eq!(h.db.rows(&people_ref()).len(), 2);
    assert!(h.db.rows(&h.archive_ref()).is_empty());
    // rows keep the run id of the job that last changed them
    let dave = h.person("Dave").unwrap();
    assert_eq!(
        dave.get(DATA_LOAD_RUN_ID),
        Some(&UniversalValue::Int(first.job_id.unwrap()))
    );
}

#[tokio::test]
async fn test_missing_primary_key_fails_checks_without_mutation() {
    let definition = TableDefinition::new(
        "People",
        people_definition()
            .columns
            .into_iter()
            .map(|c| ColumnDefinition {
                primary_key: false,
                ..c
            })
            .collect(),
    );
    let h = Harness::new(definition).await;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let statements = h.db.statement_count();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, JobState::ChecksFailed);
    assert_eq!(report.exit_code, ExitCode::Error);
    assert_eq!(report.job_id, None);
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("No primary keys declared in table Clinical.dbo.People")));
    assert_eq!(h.db.statement_count(), statements);
    assert_eq!(h.waiting_files(), 1);
    assert!(h.log.list_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_special_columns() {
    let definition = TableDefinition::new(
        "People",
        people_definition()
            .columns
            .into_iter()
            .filter(|c| !load_core::is_audit_column(&c.name))
            .collect(),
    );

    // declined: the checks fail
    let mut h = Harness::new(definition.clone()).await;
    h.load.accept_fixes = false;
    let notifier = CollectingNotifier::new(false);
    assert!(!h.orchestrator().check(&notifier).await.unwrap());
    let failure = notifier
        .events()
        .into_iter()
        .find(|e| e.result == CheckResult::Fail && e.message.contains("DataLoadRunID"))
        .unwrap();
    assert!(failure.proposed_fix.is_some());

    // accepted: the columns are added and the load proceeds
    let h = Harness::new(definition).await;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let report = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.exit_code, ExitCode::Success, "{:?}", report.errors);
    let live = h.db.describe_table(&people_ref()).await.unwrap();
    assert!(live.has_column(DATA_LOAD_RUN_ID));
    let frank = h.person("Frank").unwrap();
    assert_eq!(
        frank.get(DATA_LOAD_RUN_ID),
        Some(&UniversalValue::Int(report.job_id.unwrap()))
    );
}

#[tokio::test]
async fn test_locked_directory_fails_checks() {
    let h = Harness::new(people_definition()).await;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let directory = LoadDirectory::new(h.dir.path());
    std::fs::write(directory.lock_path(), "99\n").unwrap();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, JobState::ChecksFailed);
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("locked by job 99")));
    // someone else's lock is left alone
    assert_eq!(directory.lock_owner().as_deref(), Some("99"));
    assert!(h.db.rows(&people_ref()).is_empty());
}

#[tokio::test]
async fn test_stop_before_start_cancels() {
    let h = Harness::new(people_definition()).await;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let stop = CancellationToken::new();
    stop.cancel();

    let report = h
        .orchestrator()
        .run(&CollectingNotifier::new(true), stop, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, JobState::Cancelled);
    assert_eq!(report.exit_code, ExitCode::Error);
    assert!(h.db.rows(&people_ref()).is_empty());
    assert_eq!(h.waiting_files(), 1);
}

#[tokio::test]
async fn test_failure_retains_bubbles_until_next_run() {
    let h = Harness::new(people_definition()).await;
    put_person(h.db.as_ref(), &people_ref(), "Dave", 30, Some("ZZ9 9ZZ"))
        .await
        .unwrap();
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    // RAW -> STAGING only inserts, so the first update is the one into LIVE
    h.db.fail_next(MemoryOp::UpdateRow, Some("People"), 1, false);

    let orchestrator = h.orchestrator();
    let report = orchestrator
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.state, JobState::Crashed);
    assert_eq!(report.exit_code, ExitCode::Error);
    assert!(report.errors[0].contains("Dave"), "{:?}", report.errors);

    let job = h.log.read_job(report.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.state.as_deref(), Some("crashed"));
    assert_eq!(
        job.contaminated,
        vec!["Clinical_RAW".to_string(), "Clinical_STAGING".to_string()]
    );
    assert_eq!(h.db.databases().len(), 3);
    assert_eq!(h.waiting_files(), 1);

    // the next run warns about the leftovers, then drops and recreates them
    let notifier = CollectingNotifier::new(true);
    let retry = orchestrator
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(retry.exit_code, ExitCode::Success, "{:?}", retry.errors);
    let warnings = notifier.messages(CheckResult::Warning);
    assert!(warnings.iter().any(|m| m.contains("left Clinical_RAW")));
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);
    assert_eq!(
        h.person("Dave").unwrap().get("Postcode"),
        Some(&text("AB1 2CD"))
    );
}

#[tokio::test]
async fn test_failure_with_drop_policy_leaves_nothing() {
    let mut h = Harness::new(people_definition()).await;
    h.load.dispose.on_failure = Disposal::Drop;
    put_person(h.db.as_ref(), &people_ref(), "Dave", 30, None)
        .await
        .unwrap();
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    h.db.fail_next(MemoryOp::UpdateRow, Some("People"), 1, false);

    let report = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.state, JobState::Crashed);
    let job = h.log.read_job(report.job_id.unwrap()).await.unwrap().unwrap();
    assert!(job.contaminated.is_empty());
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);
}

#[tokio::test]
async fn test_null_key_fails_the_table() {
    let h = Harness::new(people_definition()).await;
    write_for_loading(h.dir.path(), "People.csv", "Name,Age,Postcode\n,30,AB1\n").unwrap();

    let report = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.exit_code, ExitCode::Error);
    assert_eq!(report.state, JobState::Crashed);
    assert!(report.errors.iter().any(|e| e.contains("People")));
    assert!(h.db.rows(&people_ref()).is_empty());
    let job = h.log.read_job(report.job_id.unwrap()).await.unwrap().unwrap();
    assert!(job.errors.len() >= 2);
}

#[tokio::test]
async fn test_unknown_csv_column_fails_checks() {
    let h = Harness::new(people_definition()).await;
    write_for_loading(h.dir.path(), "People.csv", "Name,Age,ShoeSize\nDave,30,9\n").unwrap();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, JobState::ChecksFailed);
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("ShoeSize")));
}

#[tokio::test]
async fn test_key_collation_mismatch() {
    let mut h = Harness::new(people_definition()).await;
    let staging: Arc<dyn Database> = Arc::new(MemoryDatabase::new(Engine::PostgreSql));
    let live: Arc<dyn Database> = h.db.clone();

    let notifier = CollectingNotifier::new(true);
    let orchestrator =
        DataLoadOrchestrator::new(h.load.clone(), live.clone(), staging.clone(), h.log.clone());
    assert!(!orchestrator.check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("Key column Name")));

    h.load.allow_key_collation_mismatch = true;
    let notifier = CollectingNotifier::new(true);
    let orchestrator = DataLoadOrchestrator::new(h.load.clone(), live, staging, h.log.clone());
    assert!(orchestrator.check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Warning)
        .iter()
        .any(|m| m.contains("allow_key_collation_mismatch")));
}

fn case_sensitive_people() -> TableDefinition {
    let mut definition = people_definition();
    definition.columns[0].collation = Some("Latin1_General_CS_AS".to_string());
    definition
}

#[tokio::test]
async fn test_case_sensitive_key_survives_into_staging() {
    let h = Harness::new(case_sensitive_people()).await;
    write_for_loading(
        h.dir.path(),
        "People.csv",
        "Name,Age,Postcode\nDave,30,AB1 2CD\ndave,30,EF3 4GH\n",
    )
    .unwrap();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("Key column")));
    assert_eq!(report.exit_code, ExitCode::Success, "{:?}", report.errors);
    assert_eq!(report.tables[0].inserts, 2);
    assert_eq!(h.db.rows(&people_ref()).len(), 2);
    assert_eq!(h.person("dave").unwrap().get("Postcode"), Some(&text("EF3 4GH")));
}

#[tokio::test]
async fn test_cross_engine_key_collation_uses_staging_default() {
    let h = Harness::new(case_sensitive_people()).await;
    let live: Arc<dyn Database> = h.db.clone();

    // MySQL compares case-insensitively unless told otherwise
    let mysql: Arc<dyn Database> = Arc::new(MemoryDatabase::new(Engine::MySql));
    let notifier = CollectingNotifier::new(true);
    let orchestrator = DataLoadOrchestrator::new(h.load.clone(), live.clone(), mysql, h.log.clone());
    assert!(!orchestrator.check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("case-sensitive in LIVE but case-insensitive in STAGING")));

    let postgres: Arc<dyn Database> = Arc::new(MemoryDatabase::new(Engine::PostgreSql));
    let notifier = CollectingNotifier::new(true);
    let orchestrator = DataLoadOrchestrator::new(h.load.clone(), live, postgres, h.log.clone());
    orchestrator.check(&notifier).await.unwrap();
    assert!(!notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("Key column")));
}

#[tokio::test]
async fn test_unreachable_server_fails_checks() {
    let h = Harness::new(people_definition()).await;
    h.db.fail_next(MemoryOp::Ping, None, 2, false);

    let notifier = CollectingNotifier::new(true);
    assert!(!h.orchestrator().check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.starts_with("Cannot connect to LIVE server")));
}

#[tokio::test]
async fn test_untranslatable_column_fails_checks() {
    let definition = TableDefinition::new(
        "People",
        vec![
            ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
            ColumnDefinition::new("Age", UniversalType::Int32).key(),
            ColumnDefinition::nullable("Shape", UniversalType::native(Engine::MicrosoftSqlServer.as_str(), "geography")),
            ColumnDefinition::nullable(DATA_LOAD_RUN_ID, UniversalType::Int32),
            ColumnDefinition::nullable(load_core::VALID_FROM, UniversalType::LocalDateTime),
        ],
    );
    let h = Harness::new(definition).await;
    let staging: Arc<dyn Database> = Arc::new(MemoryDatabase::new(Engine::MySql));
    let live: Arc<dyn Database> = h.db.clone();
    let notifier = CollectingNotifier::new(true);
    let orchestrator = DataLoadOrchestrator::new(h.load.clone(), live, staging, h.log.clone());
    assert!(!orchestrator.check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("Column Shape")));
}

fn visits_definition() -> TableDefinition {
    TableDefinition::new(
        "Visits",
        vec![
            ColumnDefinition::new("VisitId", UniversalType::Int32).key(),
            ColumnDefinition::nullable("Name", UniversalType::varchar(50)),
            ColumnDefinition::nullable(DATA_LOAD_RUN_ID, UniversalType::Int32),
            ColumnDefinition::nullable(load_core::VALID_FROM, UniversalType::LocalDateTime),
        ],
    )
}

/// A second recipe loading `Clinical.dbo.Visits` on the same server.
fn visits_recipe(load_directory: &std::path::Path) -> LoadMetadata {
    let yaml = format!(
        r#"
name: Visits
load_directory: "{}"
accept_fixes: true
live:
  engine: mssql
  host: memory
  user: loader
  password: memory
tables:
  - database: Clinical
    schema: dbo
    table: Visits
components:
  - type: csv
    table: Visits
"#,
        load_directory.display()
    );
    LoadMetadata::from_yaml_str(&yaml).unwrap()
}

#[tokio::test]
async fn test_recipes_sharing_a_root_do_not_drop_each_others_bubbles() {
    let mut h = Harness::new(people_definition()).await;
    h.load.dispose.on_success = Disposal::Retain;
    h.db.create_table(&people_ref().with_table("Visits"), &visits_definition(), true)
        .await
        .unwrap();
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let people = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(people.exit_code, ExitCode::Success, "{:?}", people.errors);
    let retained = people_ref().in_database("Clinical_RAW");
    assert!(h.db.table_exists(&retained).await.unwrap());

    let visits_dir = TempDir::new().unwrap();
    LoadDirectory::new(visits_dir.path()).create_folders().unwrap();
    write_for_loading(visits_dir.path(), "Visits.csv", "VisitId,Name\n1,Dave\n").unwrap();
    let db: Arc<dyn Database> = h.db.clone();
    let visits = DataLoadOrchestrator::new(
        visits_recipe(visits_dir.path()),
        db.clone(),
        db,
        h.log.clone(),
    );

    let notifier = CollectingNotifier::new(true);
    assert!(!visits.check(&notifier).await.unwrap());
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("Clinical_RAW was last used by job 1 of load People")));

    let report = visits
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.state, JobState::ChecksFailed);
    assert!(h.db.table_exists(&retained).await.unwrap());
}

#[tokio::test]
async fn test_claimed_location_blocks_another_load() {
    let h = Harness::new(people_definition()).await;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    let held = vec!["mssql://memory:1433/Clinical_STAGING".to_string()];
    h.log.claim_locations(42, "Visits", &held).await.unwrap();

    let notifier = CollectingNotifier::new(true);
    let report = h
        .orchestrator()
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.state, JobState::ChecksFailed);
    assert_eq!(report.job_id, None);
    assert!(notifier
        .messages(CheckResult::Fail)
        .iter()
        .any(|m| m.contains("in use by job 42 of load Visits")));
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);

    h.log.release_locations(42, "Visits").await.unwrap();
    let report = h
        .orchestrator()
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(report.exit_code, ExitCode::Success, "{:?}", report.errors);

    // the finished job gave its own claims back
    let job_id = report.job_id.unwrap();
    let again = vec![
        "mssql://memory:1433/Clinical_RAW".to_string(),
        "mssql://memory:1433/Clinical_STAGING".to_string(),
    ];
    h.log.claim_locations(job_id + 1, "Visits", &again).await.unwrap();
}

#[tokio::test]
async fn test_job_scoped_leftovers_are_dropped_by_the_next_job() {
    let mut h = Harness::new(people_definition()).await;
    h.load.naming.convention = NamingConvention::JobScoped;
    write_for_loading(h.dir.path(), "People.csv", PEOPLE_CSV).unwrap();
    h.db.fail_next(MemoryOp::InsertRow, Some("People"), 1, false);

    let orchestrator = h.orchestrator();
    let first = orchestrator
        .run(
            &CollectingNotifier::new(true),
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(first.state, JobState::Crashed);
    assert_eq!(
        h.db.databases(),
        vec!["clinical".to_string(), "clinical_raw_1".to_string()]
    );

    let notifier = CollectingNotifier::new(true);
    let second = orchestrator
        .run(&notifier, CancellationToken::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.exit_code, ExitCode::Success, "{:?}", second.errors);
    assert_eq!(second.job_id, Some(2));
    assert!(notifier
        .messages(CheckResult::Warning)
        .iter()
        .any(|m| m.contains("Job 1 left Clinical_RAW_1 contaminated")));
    assert_eq!(h.db.databases(), vec!["clinical".to_string()]);
}
