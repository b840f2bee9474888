//! Unit tests for the load-log crate.

use chrono::Utc;
use tempfile::TempDir;

use crate::{DataLoadJob, ExitCode, FilesystemLogStore, LoadLogStore, MemoryLogStore, TableLoadInfo};

fn people_info(inserts: u64, updates: u64) -> TableLoadInfo {
    TableLoadInfo {
        table: "Clinical.People".to_string(),
        inserts,
        updates,
        started: Utc::now(),
        finished: Utc::now(),
    }
}

// ============================================================================
// ExitCode Tests
// ============================================================================

#[test]
fn test_exit_code_process_codes() {
    assert_eq!(ExitCode::Success.process_code(), 0);
    assert_eq!(ExitCode::OperationNotRequired.process_code(), 2);
    assert_eq!(ExitCode::Error.process_code(), 1);
    assert_eq!(ExitCode::OperationNotRequired.to_string(), "operation_not_required");
}

#[test]
fn test_exit_code_serialization() {
    let json = serde_json::to_string(&ExitCode::OperationNotRequired).unwrap();
    assert_eq!(json, "\"operation_not_required\"");
    let parsed: ExitCode = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, ExitCode::OperationNotRequired);
}

// ============================================================================
// DataLoadJob Tests
// ============================================================================

#[test]
fn test_job_totals_and_close() {
    let mut job = DataLoadJob::new(7, "Clinical");
    job.tables.push(people_info(1, 1));
    job.tables.push(people_info(3, 0));
    assert_eq!(job.total_inserts(), 4);
    assert_eq!(job.total_updates(), 1);
    assert!(job.ensure_open().is_ok());

    job.close(ExitCode::Success, "completed", vec![]);
    assert!(job.is_closed());
    let err = job.ensure_open().unwrap_err().to_string();
    assert!(err.contains("Job 7 is closed"));
}

// ============================================================================
// MemoryLogStore Tests
// ============================================================================

#[tokio::test]
async fn test_memory_store_lifecycle() {
    let store = MemoryLogStore::new();
    assert_eq!(store.next_job_id().await.unwrap(), 1);

    store.open_job(1, "Clinical").await.unwrap();
    assert_eq!(store.next_job_id().await.unwrap(), 2);
    assert!(store.open_job(1, "Clinical").await.is_err());

    store.record_table(1, people_info(1, 1)).await.unwrap();
    store.record_error(1, "People: boom".to_string()).await.unwrap();
    let closed = store
        .close_job(1, ExitCode::Success, "completed", vec![])
        .await
        .unwrap();
    assert_eq!(closed.tables.len(), 1);
    assert_eq!(closed.errors, vec!["People: boom".to_string()]);
    assert_eq!(closed.exit_code, Some(ExitCode::Success));
}

#[tokio::test]
async fn test_memory_store_rejects_writes_after_close() {
    let store = MemoryLogStore::new();
    store.open_job(1, "Clinical").await.unwrap();
    store
        .close_job(1, ExitCode::OperationNotRequired, "completed", vec![])
        .await
        .unwrap();

    assert!(store.record_table(1, people_info(1, 0)).await.is_err());
    assert!(store.record_error(1, "late".to_string()).await.is_err());
    assert!(store
        .close_job(1, ExitCode::Error, "crashed", vec![])
        .await
        .is_err());

    let job = store.read_job(1).await.unwrap().unwrap();
    assert_eq!(job.exit_code, Some(ExitCode::OperationNotRequired));
    assert!(job.tables.is_empty());
}

#[tokio::test]
async fn test_memory_store_unknown_job() {
    let store = MemoryLogStore::new();
    assert!(store.read_job(42).await.unwrap().is_none());
    assert!(store.record_error(42, "x".to_string()).await.is_err());
}

#[tokio::test]
async fn test_memory_store_location_claims() {
    let store = MemoryLogStore::new();
    let shared = vec!["mssql://sql01:1433/Clinical_RAW".to_string()];
    store.claim_locations(1, "People", &shared).await.unwrap();
    // claiming again is a no-op for the holder
    store.claim_locations(1, "People", &shared).await.unwrap();

    let other = vec![
        "mssql://sql01:1433/Visits_RAW".to_string(),
        "MSSQL://SQL01:1433/clinical_raw".to_string(),
    ];
    let err = store.claim_locations(1, "Visits", &other).await.unwrap_err();
    assert!(err.to_string().contains("in use by job 1 of load People"), "{err}");

    store.release_locations(1, "People").await.unwrap();
    store.claim_locations(2, "Visits", &other).await.unwrap();
}

// ============================================================================
// FilesystemLogStore Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_allocates_ids_from_existing_files() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path().join("logs"));
    assert_eq!(store.next_job_id().await.unwrap(), 1);

    store.open_job(1, "Clinical").await.unwrap();
    store.open_job(5, "Clinical").await.unwrap();
    std::fs::write(tmp.path().join("logs").join("notes.txt"), "ignored").unwrap();

    assert_eq!(store.next_job_id().await.unwrap(), 6);
    assert!(tmp.path().join("logs").join("job_5.json").exists());
}

#[tokio::test]
async fn test_filesystem_store_roundtrip_and_close() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path());

    store.open_job(3, "Clinical").await.unwrap();
    store.record_table(3, people_info(1, 1)).await.unwrap();
    store
        .close_job(
            3,
            ExitCode::Error,
            "crashed",
            vec!["Clinical_RAW".to_string(), "Clinical_STAGING".to_string()],
        )
        .await
        .unwrap();

    // A fresh store over the same directory sees the same record
    let reopened = FilesystemLogStore::new(tmp.path());
    let job = reopened.read_job(3).await.unwrap().unwrap();
    assert_eq!(job.load_name, "Clinical");
    assert_eq!(job.state.as_deref(), Some("crashed"));
    assert_eq!(job.contaminated.len(), 2);
    assert_eq!(job.tables[0].inserts, 1);

    assert!(reopened.record_table(3, people_info(1, 0)).await.is_err());
}

#[tokio::test]
async fn test_filesystem_store_refuses_duplicate_open() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path());
    store.open_job(1, "Clinical").await.unwrap();
    let err = store.open_job(1, "Clinical").await.unwrap_err();
    assert!(format!("{err:#}").contains("already exists"));
}

#[tokio::test]
async fn test_filesystem_store_lists_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path());
    for id in [10, 2, 7] {
        store.open_job(id, "Clinical").await.unwrap();
    }
    let ids: Vec<i64> = store
        .list_jobs()
        .await
        .unwrap()
        .iter()
        .map(|j| j.job_id)
        .collect();
    assert_eq!(ids, vec![2, 7, 10]);
}

#[tokio::test]
async fn test_filesystem_store_location_claims_are_all_or_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path());
    let raw = "mssql://sql01:1433/Clinical_RAW".to_string();
    let staging = "mssql://sql01:1433/Clinical_STAGING".to_string();
    store
        .claim_locations(4, "People", &[staging.clone()])
        .await
        .unwrap();

    // a second process sees the claim through the same directory
    let other = FilesystemLogStore::new(tmp.path());
    let err = other
        .claim_locations(5, "Visits", &[raw.clone(), staging.clone()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("in use by job 4 of load People"), "{err}");
    // the RAW claim taken before the conflict was given back
    store.claim_locations(4, "People", &[raw.clone()]).await.unwrap();

    store.release_locations(4, "People").await.unwrap();
    other
        .claim_locations(5, "Visits", &[raw, staging])
        .await
        .unwrap();
    // claim files do not count as job records
    assert_eq!(other.next_job_id().await.unwrap(), 1);
}

#[tokio::test]
async fn test_filesystem_store_records_bubbles() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemLogStore::new(tmp.path());
    store.open_job(1, "People").await.unwrap();
    store
        .record_bubbles(1, vec!["Clinical_RAW".to_string()])
        .await
        .unwrap();
    let job = store.read_job(1).await.unwrap().unwrap();
    assert!(job.used_bubble("clinical_raw"));
    assert!(!job.used_bubble("Clinical_STAGING"));
}
