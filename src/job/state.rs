use crate::error::{LoadError, Result};
use serde::Serialize;
use std::fmt;

/// Where a job is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    ChecksRunning,
    ChecksFailed,
    RawCreated,
    RawPopulated,
    MigratedToStaging,
    MigratedToLive,
    Archived,
    Completed,
    Cancelled,
    Crashed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotStarted => "not_started",
            JobState::ChecksRunning => "checks_running",
            JobState::ChecksFailed => "checks_failed",
            JobState::RawCreated => "raw_created",
            JobState::RawPopulated => "raw_populated",
            JobState::MigratedToStaging => "migrated_to_staging",
            JobState::MigratedToLive => "migrated_to_live",
            JobState::Archived => "archived",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Crashed => "crashed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::ChecksFailed | JobState::Completed | JobState::Cancelled | JobState::Crashed
        )
    }

    /// True once RAW exists, so a failure leaves bubbles behind.
    pub fn has_bubbles(&self) -> bool {
        matches!(
            self,
            JobState::RawCreated
                | JobState::RawPopulated
                | JobState::MigratedToStaging
                | JobState::MigratedToLive
                | JobState::Archived
        )
    }

    fn can_advance_to(&self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | Crashed) {
            return true;
        }
        matches!(
            (self, next),
            (NotStarted, ChecksRunning)
                | (ChecksRunning, ChecksFailed)
                | (ChecksRunning, RawCreated)
                // nothing new to load
                | (ChecksRunning, Completed)
                | (RawCreated, RawPopulated)
                | (RawPopulated, MigratedToStaging)
                | (MigratedToStaging, MigratedToLive)
                | (MigratedToLive, Archived)
                | (Archived, Completed)
        )
    }

    /// Move to `next`, rejecting transitions the pipeline never makes.
    pub fn advance(self, next: JobState) -> Result<JobState> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(LoadError::Internal(format!(
                "illegal job state transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
