//! The execution record of one job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job as seen by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    /// Data was loaded
    Success,
    /// There was no new data; nothing was touched
    OperationNotRequired,
    /// The job failed, was cancelled, or crashed
    Error,
}

impl ExitCode {
    /// Get the string representation of this exit code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitCode::Success => "success",
            ExitCode::OperationNotRequired => "operation_not_required",
            ExitCode::Error => "error",
        }
    }

    /// Process exit status for the CLI.
    pub fn process_code(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::OperationNotRequired => 2,
            ExitCode::Error => 1,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insert and update counts for one table in one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLoadInfo {
    /// Destination table, qualified
    pub table: String,
    pub inserts: u64,
    pub updates: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

/// One physical run of a load recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLoadJob {
    pub job_id: i64,
    pub load_name: String,
    pub started: DateTime<Utc>,
    /// Set when the job is closed
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<ExitCode>,
    /// Terminal orchestrator state (`completed`, `checks_failed`, `cancelled`, `crashed`)
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableLoadInfo>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// RAW/STAGING locations the job worked in
    #[serde(default)]
    pub bubbles: Vec<String>,
    /// RAW/STAGING databases left behind after a failure
    #[serde(default)]
    pub contaminated: Vec<String>,
}

impl DataLoadJob {
    /// A freshly opened job.
    pub fn new(job_id: i64, load_name: impl Into<String>) -> Self {
        Self {
            job_id,
            load_name: load_name.into(),
            started: Utc::now(),
            finished: None,
            exit_code: None,
            state: None,
            tables: Vec::new(),
            errors: Vec::new(),
            bubbles: Vec::new(),
            contaminated: Vec::new(),
        }
    }

    /// True when this job worked in `location`.
    pub fn used_bubble(&self, location: &str) -> bool {
        self.bubbles.iter().any(|b| b.eq_ignore_ascii_case(location))
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.finished.is_some()
    }

    /// Fail if the record is already closed.
    pub fn ensure_open(&self) -> anyhow::Result<()> {
        if self.is_closed() {
            anyhow::bail!("Job {} is closed and cannot be modified", self.job_id);
        }
        Ok(())
    }

    /// Finalise the record.
    pub fn close(&mut self, exit_code: ExitCode, state: impl Into<String>, contaminated: Vec<String>) {
        self.finished = Some(Utc::now());
        self.exit_code = Some(exit_code);
        self.state = Some(state.into());
        self.contaminated = contaminated;
    }

    /// Total inserts across tables.
    pub fn total_inserts(&self) -> u64 {
        self.tables.iter().map(|t| t.inserts).sum()
    }

    /// Total updates across tables.
    pub fn total_updates(&self) -> u64 {
        self.tables.iter().map(|t| t.updates).sum()
    }
}

/// A running job's hold on one RAW/STAGING location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationClaim {
    /// Server and object name, e.g. `mssql://sql01:1433/Clinical_RAW`
    pub location: String,
    pub job_id: i64,
    pub load_name: String,
}

impl LocationClaim {
    pub fn new(location: impl Into<String>, job_id: i64, load_name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            job_id,
            load_name: load_name.into(),
        }
    }

    /// Job ids are only allocated when a job opens, so two loads can briefly share one.
    pub fn is_held_by(&self, job_id: i64, load_name: &str) -> bool {
        self.job_id == job_id && self.load_name == load_name
    }

    /// Error for a job that found this claim in its way.
    pub fn conflict(&self) -> anyhow::Error {
        anyhow::anyhow!(
            "{} is in use by job {} of load {}",
            self.location,
            self.job_id,
            self.load_name
        )
    }
}
