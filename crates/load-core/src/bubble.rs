//! Load stages and the audit columns every LIVE table carries.

use crate::schema::{ColumnDefinition, TableDefinition};
use crate::types::UniversalType;
use serde::{Deserialize, Serialize};

/// One stage of a load.
///
/// Raw precedes Staging precedes Live. Archive is a shadow of Live, not a load stage,
/// and sorts last only so the enum has a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bubble {
    /// Loosely-constrained landing area for freshly loaded data
    Raw,
    /// Schema-faithful holding area diffed against LIVE
    Staging,
    /// The authoritative tables
    Live,
    /// Trigger-maintained history of superseded LIVE rows
    Archive,
}

impl Bubble {
    /// Get the string representation of this bubble.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bubble::Raw => "raw",
            Bubble::Staging => "staging",
            Bubble::Live => "live",
            Bubble::Archive => "archive",
        }
    }

    /// True for the disposable bubbles a job creates and drops.
    pub fn is_transient(&self) -> bool {
        matches!(self, Bubble::Raw | Bubble::Staging)
    }
}

impl std::fmt::Display for Bubble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load execution that last touched a row; NULL means never touched by a load.
pub const DATA_LOAD_RUN_ID: &str = "DataLoadRunID";

/// When the current row version became valid.
pub const VALID_FROM: &str = "ValidFrom";

/// When an archived row version stopped being valid (archive tables only).
pub const VALID_TO: &str = "ValidTo";

/// Database user whose statement superseded the archived row (archive tables only).
pub const ARCHIVE_USER: &str = "UserID";

/// `U` for update, `D` for delete (archive tables only).
pub const ARCHIVE_STATUS: &str = "Status";

/// Suffix appended to a LIVE table name to name its archive table.
pub const ARCHIVE_SUFFIX: &str = "_Archive";

/// Archive table name for a LIVE table.
pub fn archive_table_name(table: &str) -> String {
    format!("{table}{ARCHIVE_SUFFIX}")
}

/// True for the columns the engine injects and source data never supplies.
pub fn is_audit_column(name: &str) -> bool {
    [DATA_LOAD_RUN_ID, VALID_FROM, VALID_TO, ARCHIVE_USER, ARCHIVE_STATUS]
        .iter()
        .any(|special| special.eq_ignore_ascii_case(name))
}

/// The two audit columns carried by LIVE and STAGING tables.
pub fn live_audit_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::nullable(DATA_LOAD_RUN_ID, UniversalType::Int32),
        ColumnDefinition::nullable(VALID_FROM, UniversalType::LocalDateTime),
    ]
}

/// The columns an archive table adds on top of the LIVE columns.
pub fn archive_audit_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::nullable(VALID_TO, UniversalType::LocalDateTime),
        ColumnDefinition::nullable(ARCHIVE_USER, UniversalType::varchar(128)),
        ColumnDefinition::nullable(ARCHIVE_STATUS, UniversalType::char(1)),
    ]
}

/// Shape of the archive shadow for `live`: every LIVE column nullable and without
/// key or identity, then the archive audit columns LIVE does not already carry.
pub fn archive_table_definition(name: impl Into<String>, live: &TableDefinition) -> TableDefinition {
    let mut columns: Vec<ColumnDefinition> = live
        .columns
        .iter()
        .map(|c| ColumnDefinition {
            nullable: true,
            primary_key: false,
            identity: false,
            ..c.clone()
        })
        .collect();
    columns.extend(
        archive_audit_columns()
            .into_iter()
            .filter(|audit| !live.has_column(&audit.name)),
    );
    TableDefinition::new(name, columns)
}
