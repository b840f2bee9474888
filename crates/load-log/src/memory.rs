//! In-memory log store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::job::{DataLoadJob, ExitCode, LocationClaim, TableLoadInfo};
use crate::store::LoadLogStore;

/// Keeps job records in a map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryLogStore {
    jobs: Mutex<BTreeMap<i64, DataLoadJob>>,
    claims: Mutex<BTreeMap<String, LocationClaim>>,
}

impl MemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, job_id: i64, f: F) -> Result<DataLoadJob>
    where
        F: FnOnce(&mut DataLoadJob) + Send,
    {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow::anyhow!("Job {job_id} not found"))?;
        job.ensure_open()?;
        f(job);
        Ok(job.clone())
    }
}

#[async_trait]
impl LoadLogStore for MemoryLogStore {
    async fn next_job_id(&self) -> Result<i64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.keys().next_back().map(|id| id + 1).unwrap_or(1))
    }

    async fn open_job(&self, job_id: i64, load_name: &str) -> Result<DataLoadJob> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job_id) {
            anyhow::bail!("Job {job_id} already exists");
        }
        let job = DataLoadJob::new(job_id, load_name);
        jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn record_table(&self, job_id: i64, info: TableLoadInfo) -> Result<()> {
        self.update(job_id, |job| job.tables.push(info)).await?;
        Ok(())
    }

    async fn record_error(&self, job_id: i64, message: String) -> Result<()> {
        self.update(job_id, |job| job.errors.push(message)).await?;
        Ok(())
    }

    async fn record_bubbles(&self, job_id: i64, bubbles: Vec<String>) -> Result<()> {
        self.update(job_id, |job| job.bubbles = bubbles).await?;
        Ok(())
    }

    async fn claim_locations(&self, job_id: i64, load_name: &str, locations: &[String]) -> Result<()> {
        let mut claims = self.claims.lock().await;
        for location in locations {
            if let Some(claim) = claims.get(&location.to_lowercase()) {
                if !claim.is_held_by(job_id, load_name) {
                    return Err(claim.conflict());
                }
            }
        }
        for location in locations {
            claims.insert(
                location.to_lowercase(),
                LocationClaim::new(location.clone(), job_id, load_name),
            );
        }
        Ok(())
    }

    async fn release_locations(&self, job_id: i64, load_name: &str) -> Result<()> {
        self.claims
            .lock()
            .await
            .retain(|_, claim| !claim.is_held_by(job_id, load_name));
        Ok(())
    }

    async fn close_job(
        &self,
        job_id: i64,
        exit_code: ExitCode,
        state: &str,
        contaminated: Vec<String>,
    ) -> Result<DataLoadJob> {
        self.update(job_id, |job| job.close(exit_code, state, contaminated))
            .await
    }

    async fn read_job(&self, job_id: i64) -> Result<Option<DataLoadJob>> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<DataLoadJob>> {
        Ok(self.jobs.lock().await.values().cloned().collect())
    }
}
