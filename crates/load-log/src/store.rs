//! Log storage trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::job::{DataLoadJob, ExitCode, TableLoadInfo};

/// Append-only storage for job records, plus the location claims that keep jobs of
/// different loads out of each other's RAW/STAGING.
///
/// Implementations must reject writes to a closed job.
#[async_trait]
pub trait LoadLogStore: Send + Sync {
    /// Id the next opened job should use.
    async fn next_job_id(&self) -> Result<i64>;

    /// Create the record for a new job. Fails if `job_id` is taken.
    async fn open_job(&self, job_id: i64, load_name: &str) -> Result<DataLoadJob>;

    /// Append a table outcome.
    async fn record_table(&self, job_id: i64, info: TableLoadInfo) -> Result<()>;

    /// Append an error message.
    async fn record_error(&self, job_id: i64, message: String) -> Result<()>;

    /// Record the RAW/STAGING locations the job works in.
    async fn record_bubbles(&self, job_id: i64, bubbles: Vec<String>) -> Result<()>;

    /// Claim `locations` for a running job, all or nothing. Fails naming the holder
    /// when another job holds any of them. Claims are compared case-insensitively.
    async fn claim_locations(&self, job_id: i64, load_name: &str, locations: &[String]) -> Result<()>;

    /// Give back every location held by `job_id` of `load_name`.
    async fn release_locations(&self, job_id: i64, load_name: &str) -> Result<()>;

    /// Finalise the record; returns the closed job.
    async fn close_job(
        &self,
        job_id: i64,
        exit_code: ExitCode,
        state: &str,
        contaminated: Vec<String>,
    ) -> Result<DataLoadJob>;

    /// Read one job, if it exists.
    async fn read_job(&self, job_id: i64) -> Result<Option<DataLoadJob>>;

    /// Every job, oldest first.
    async fn list_jobs(&self) -> Result<Vec<DataLoadJob>>;
}
