//! Filesystem-based log storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::job::{DataLoadJob, ExitCode, LocationClaim, TableLoadInfo};
use crate::store::LoadLogStore;

/// Stores each job as `job_<id>.json` in a directory.
///
/// Job ids are allocated as the largest existing id plus one. Opening a job claims its
/// file with `create_new`, so two processes racing for the same id cannot both win.
/// Location claims live under `locations/`, one file per location, taken the same way.
pub struct FilesystemLogStore {
    dir: PathBuf,
}

impl FilesystemLogStore {
    /// Create a new FilesystemLogStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&self, job_id: i64) -> PathBuf {
        self.dir.join(format!("job_{job_id}.json"))
    }

    fn job_ids(&self) -> Result<Vec<i64>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(id) = name
                .strip_prefix("job_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|id| id.parse::<i64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn load(&self, job_id: i64) -> Result<DataLoadJob> {
        let path = self.job_path(job_id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read job record {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse job record {}", path.display()))
    }

    fn save(&self, job: &DataLoadJob) -> Result<()> {
        let path = self.job_path(job.job_id);
        std::fs::write(&path, serde_json::to_string_pretty(job)?)
            .with_context(|| format!("Failed to write job record {}", path.display()))
    }

    fn locations_dir(&self) -> PathBuf {
        self.dir.join("locations")
    }

    /// Claim file for a location. Names are case-folded and anything outside
    /// `[a-z0-9_-]` is percent-encoded so distinct locations never share a file.
    fn claim_path(&self, location: &str) -> PathBuf {
        let mut name = String::new();
        for byte in location.to_lowercase().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        self.locations_dir().join(format!("{name}.lock"))
    }

    fn read_claim(path: &Path) -> Result<LocationClaim> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read location claim {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse location claim {}", path.display()))
    }

    fn update<F>(&self, job_id: i64, f: F) -> Result<DataLoadJob>
    where
        F: FnOnce(&mut DataLoadJob),
    {
        let mut job = self.load(job_id)?;
        job.ensure_open()?;
        f(&mut job);
        self.save(&job)?;
        Ok(job)
    }
}

#[async_trait]
impl LoadLogStore for FilesystemLogStore {
    async fn next_job_id(&self) -> Result<i64> {
        Ok(self.job_ids()?.last().map(|id| id + 1).unwrap_or(1))
    }

    async fn open_job(&self, job_id: i64, load_name: &str) -> Result<DataLoadJob> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.job_path(job_id);
        let job = DataLoadJob::new(job_id, load_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("Job record {} already exists", path.display()))?;
        file.write_all(serde_json::to_string_pretty(&job)?.as_bytes())?;
        tracing::info!("Opened job {} in {}", job_id, path.display());
        Ok(job)
    }

    async fn record_table(&self, job_id: i64, info: TableLoadInfo) -> Result<()> {
        self.update(job_id, |job| job.tables.push(info))?;
        Ok(())
    }

    async fn record_error(&self, job_id: i64, message: String) -> Result<()> {
        self.update(job_id, |job| job.errors.push(message))?;
        Ok(())
    }

    async fn record_bubbles(&self, job_id: i64, bubbles: Vec<String>) -> Result<()> {
        self.update(job_id, |job| job.bubbles = bubbles)?;
        Ok(())
    }

    async fn claim_locations(&self, job_id: i64, load_name: &str, locations: &[String]) -> Result<()> {
        std::fs::create_dir_all(self.locations_dir())?;
        let mut taken = Vec::new();
        for location in locations {
            let path = self.claim_path(location);
            let claim = LocationClaim::new(location.clone(), job_id, load_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(serde_json::to_string_pretty(&claim)?.as_bytes())?;
                    taken.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = Self::read_claim(&path)?;
                    if holder.is_held_by(job_id, load_name) {
                        continue;
                    }
                    for path in &taken {
                        let _ = std::fs::remove_file(path);
                    }
                    return Err(anyhow::anyhow!(
                        "{} (remove {} if that job is no longer running)",
                        holder.conflict(),
                        path.display()
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!("Job {job_id} claimed {} location(s)", locations.len());
        Ok(())
    }

    async fn release_locations(&self, job_id: i64, load_name: &str) -> Result<()> {
        let dir = self.locations_dir();
        if !dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if Self::read_claim(&path)?.is_held_by(job_id, load_name) {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to release {}", path.display()))?;
            }
        }
        Ok(())
    }

    async fn close_job(
        &self,
        job_id: i64,
        exit_code: ExitCode,
        state: &str,
        contaminated: Vec<String>,
    ) -> Result<DataLoadJob> {
        let job = self.update(job_id, |job| job.close(exit_code, state, contaminated))?;
        tracing::info!("Closed job {} with {}", job_id, exit_code);
        Ok(job)
    }

    async fn read_job(&self, job_id: i64) -> Result<Option<DataLoadJob>> {
        if !self.job_path(job_id).exists() {
            return Ok(None);
        }
        self.load(job_id).map(Some)
    }

    async fn list_jobs(&self) -> Result<Vec<DataLoadJob>> {
        self.job_ids()?.into_iter().map(|id| self.load(id)).collect()
    }
}
