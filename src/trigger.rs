//! Archive trigger management on LIVE tables.
//!
//! The archive trigger copies the old image of every updated or deleted LIVE row into
//! `<Table>_Archive` before the change lands, so the audit trail holds even for
//! changes made outside a load.

use crate::database::{with_timeout, Database};
use crate::error::{LoadError, Result};
use load_core::{archive_table_name, ArchiveTrigger, TableDefinition, TableRef};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// State of the archive trigger on one LIVE table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerStatus {
    NoTrigger,
    TriggerPresentAndValid,
    /// A trigger exists but does not write every LIVE column into the archive table
    TriggerPresentButStale,
}

/// True when `body` (already lowercased) names `ident` as a whole identifier, so
/// `Id` is not found inside `ValidFrom`.
fn mentions_identifier(body: &str, ident: &str) -> bool {
    let ident = ident.to_lowercase();
    if ident.is_empty() {
        return false;
    }
    let is_ident_char = |c: char| c.is_alphanumeric() || c == '_' || c == '$' || c == '#';
    body.match_indices(&ident).any(|(start, _)| {
        let before = body[..start].chars().next_back();
        let after = body[start + ident.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerStatus::NoTrigger => "no trigger",
            TriggerStatus::TriggerPresentAndValid => "present and valid",
            TriggerStatus::TriggerPresentButStale => "present but stale",
        };
        f.write_str(s)
    }
}

/// What `drop_trigger` did.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTriggerReport {
    pub dropped: bool,
    pub drop_message: String,
    /// Leftover trigger shells found after the drop, if any
    pub residual_message: String,
}

/// Installs, validates and removes the archive trigger for one LIVE table.
pub struct TriggerImplementer<'a> {
    db: &'a dyn Database,
    live: TableRef,
    definition: TableDefinition,
}

impl<'a> TriggerImplementer<'a> {
    /// `definition` is the LIVE table as discovered, audit columns included.
    pub fn new(db: &'a dyn Database, live: TableRef, definition: TableDefinition) -> Self {
        Self {
            db,
            live,
            definition,
        }
    }

    pub fn archive_table(&self) -> TableRef {
        self.live.with_table(archive_table_name(&self.live.table))
    }

    pub fn trigger_spec(&self) -> ArchiveTrigger {
        ArchiveTrigger {
            live: self.live.clone(),
            archive: self.archive_table(),
            columns: self
                .definition
                .columns
                .iter()
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    /// Classify the installed trigger by reading its body back from the catalogue.
    pub async fn get_trigger_status(&self) -> Result<TriggerStatus> {
        let expected = self.db.dialect().trigger_names(&self.live);
        let bodies: Vec<(String, String)> = self
            .db
            .trigger_bodies(&self.live)
            .await?
            .into_iter()
            .filter(|(name, _)| expected.iter().any(|e| e.eq_ignore_ascii_case(name)))
            .collect();
        if bodies.is_empty() {
            return Ok(TriggerStatus::NoTrigger);
        }
        if bodies.len() < expected.len() {
            return Ok(TriggerStatus::TriggerPresentButStale);
        }
        let archive = self.archive_table().table;
        let valid = bodies.iter().all(|(_, body)| {
            let body = body.to_lowercase();
            mentions_identifier(&body, &archive)
                && self
                    .definition
                    .columns
                    .iter()
                    .all(|c| mentions_identifier(&body, &c.name))
        });
        Ok(if valid {
            TriggerStatus::TriggerPresentAndValid
        } else {
            TriggerStatus::TriggerPresentButStale
        })
    }

    /// Install the trigger, creating the archive table first if needed. A valid
    /// trigger is left alone; a stale one is dropped and recreated.
    pub async fn create_trigger(&self, timeout: Duration) -> Result<TriggerStatus> {
        with_timeout(
            &format!("Creating archive trigger on {}", self.live),
            timeout,
            self.create_trigger_inner(),
        )
        .await
    }

    async fn create_trigger_inner(&self) -> Result<TriggerStatus> {
        match self.get_trigger_status().await? {
            TriggerStatus::TriggerPresentAndValid => {
                info!("Archive trigger on {} is already valid", self.live);
                return Ok(TriggerStatus::TriggerPresentAndValid);
            }
            TriggerStatus::TriggerPresentButStale => {
                warn!("Archive trigger on {} is stale, recreating it", self.live);
                self.db.drop_archive_trigger(&self.live).await?;
            }
            TriggerStatus::NoTrigger => {}
        }

        let archive = self.archive_table();
        if !self.db.table_exists(&archive).await? {
            info!("Creating archive table {archive}");
            self.db
                .create_archive_table(&archive, &self.definition)
                .await?;
        }

        self.db.create_archive_trigger(&self.trigger_spec()).await?;
        let status = self.get_trigger_status().await?;
        if status != TriggerStatus::TriggerPresentAndValid {
            return Err(LoadError::Trigger {
                table: self.live.to_string(),
                message: format!("trigger was created but reads back as {status}"),
            });
        }
        info!("Archive trigger on {} writes to {archive}", self.live);
        Ok(status)
    }

    /// Remove the trigger. Failures are reported in the returned text rather than as
    /// errors, since a partially dropped trigger still needs describing.
    pub async fn drop_trigger(&self) -> DropTriggerReport {
        let (dropped, drop_message) = match self.db.drop_archive_trigger(&self.live).await {
            Ok(messages) if messages.is_empty() => (true, "Nothing to drop".to_string()),
            Ok(messages) => (true, messages.join("\n")),
            Err(e) => (false, format!("Failed to drop trigger on {}: {e}", self.live)),
        };
        let residual_message = match self.get_trigger_status().await {
            Ok(TriggerStatus::NoTrigger) => "No residual trigger found".to_string(),
            Ok(status) => format!("Residual trigger on {} is {status}", self.live),
            Err(e) => format!("Could not check for residual trigger on {}: {e}", self.live),
        };
        DropTriggerReport {
            dropped,
            drop_message,
            residual_message,
        }
    }
}
