//! Pre-flight check reporting.
//!
//! Checks report through a [`CheckNotifier`] rather than returning errors so that one
//! run can surface every problem at once, and so the notifier can decide whether a
//! proposed fix (create a missing folder, add the special columns, install a trigger)
//! should be applied.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    Success,
    Warning,
    Fail,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckResult::Success => write!(f, "OK"),
            CheckResult::Warning => write!(f, "WARNING"),
            CheckResult::Fail => write!(f, "FAIL"),
        }
    }
}

/// One reported check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckEvent {
    pub message: String,
    pub result: CheckResult,
    /// A change that would make the check pass, offered to the notifier
    pub proposed_fix: Option<String>,
}

impl CheckEvent {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: CheckResult::Success,
            proposed_fix: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: CheckResult::Warning,
            proposed_fix: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: CheckResult::Fail,
            proposed_fix: None,
        }
    }

    /// Offer `fix` alongside this event.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.proposed_fix = Some(fix.into());
        self
    }
}

impl fmt::Display for CheckEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.result, self.message)?;
        if let Some(fix) = &self.proposed_fix {
            write!(f, " (proposed fix: {fix})")?;
        }
        Ok(())
    }
}

/// Receives check events.
pub trait CheckNotifier: Send + Sync {
    /// Report `event`. The return value says whether its proposed fix may be applied
    /// and is ignored for events without one.
    fn on_check(&self, event: CheckEvent) -> bool;
}

/// Logs every event; accepts fixes only when configured to.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    accept_fixes: bool,
}

impl TracingNotifier {
    pub fn new(accept_fixes: bool) -> Self {
        Self { accept_fixes }
    }
}

impl CheckNotifier for TracingNotifier {
    fn on_check(&self, event: CheckEvent) -> bool {
        match event.result {
            CheckResult::Success => info!("{}", event.message),
            CheckResult::Warning => warn!("{}", event.message),
            CheckResult::Fail => error!("{}", event.message),
        }
        match &event.proposed_fix {
            Some(fix) if self.accept_fixes => {
                info!("Applying fix: {fix}");
                true
            }
            Some(fix) => {
                warn!("Not applying fix (fixes not accepted): {fix}");
                false
            }
            None => false,
        }
    }
}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    accept_fixes: bool,
    events: Mutex<Vec<CheckEvent>>,
}

impl CollectingNotifier {
    pub fn new(accept_fixes: bool) -> Self {
        Self {
            accept_fixes,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<CheckEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most severe result reported so far.
    pub fn worst(&self) -> CheckResult {
        self.events()
            .iter()
            .map(|e| e.result)
            .max()
            .unwrap_or(CheckResult::Success)
    }

    pub fn has_failures(&self) -> bool {
        self.worst() == CheckResult::Fail
    }

    /// Messages of every event with the given result.
    pub fn messages(&self, result: CheckResult) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.result == result)
            .map(|e| e.message)
            .collect()
    }
}

impl CheckNotifier for CollectingNotifier {
    fn on_check(&self, event: CheckEvent) -> bool {
        let accepted = self.accept_fixes && event.proposed_fix.is_some();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        accepted
    }
}
