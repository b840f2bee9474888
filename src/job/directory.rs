//! The load directory: incoming files, archived files and the job lock.

use crate::error::{LoadError, Result};
use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DATA: &str = "Data";
const FOR_LOADING: &str = "ForLoading";
const FOR_ARCHIVING: &str = "ForArchiving";
const LOCK_FILE: &str = ".load.lock";

/// Folder layout under a recipe's `load_directory`.
#[derive(Debug, Clone)]
pub struct LoadDirectory {
    root: PathBuf,
}

impl LoadDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn for_loading(&self) -> PathBuf {
        self.root.join(DATA).join(FOR_LOADING)
    }

    pub fn for_archiving(&self) -> PathBuf {
        self.root.join(DATA).join(FOR_ARCHIVING)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(DATA).join(LOCK_FILE)
    }

    /// Folders that should exist but do not.
    pub fn missing_folders(&self) -> Vec<PathBuf> {
        [self.for_loading(), self.for_archiving()]
            .into_iter()
            .filter(|p| !p.is_dir())
            .collect()
    }

    pub fn create_folders(&self) -> Result<()> {
        std::fs::create_dir_all(self.for_loading())?;
        std::fs::create_dir_all(self.for_archiving())?;
        Ok(())
    }

    /// Job id recorded in an existing lock file.
    pub fn lock_owner(&self) -> Option<String> {
        std::fs::read_to_string(self.lock_path())
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Take the job lock. Fails if another job holds it.
    pub fn lock(&self, job_id: i64) -> Result<JobLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = self.lock_owner().unwrap_or_else(|| "unknown".to_string());
                return Err(LoadError::config(format!(
                    "load directory {} is locked by job {owner} (remove {} if that job is no longer running)",
                    self.root.display(),
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{job_id}")?;
        debug!("Took lock {}", path.display());
        Ok(JobLock { path })
    }

    /// Move `files` into `ForArchiving/<yyyy-mm-dd>_job<id>/`. Returns the folder.
    pub fn archive_files(&self, job_id: i64, date: NaiveDate, files: &[PathBuf]) -> Result<PathBuf> {
        let folder = self
            .for_archiving()
            .join(format!("{}_job{job_id}", date.format("%Y-%m-%d")));
        std::fs::create_dir_all(&folder)?;
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = folder.join(name);
            if std::fs::rename(file, &target).is_err() {
                // rename cannot cross filesystems
                std::fs::copy(file, &target)?;
                std::fs::remove_file(file)?;
            }
            info!("Archived {} to {}", file.display(), target.display());
        }
        Ok(folder)
    }
}

/// Held for the duration of a job; removes the lock file when dropped.
#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {e}", self.path.display());
        }
    }
}
