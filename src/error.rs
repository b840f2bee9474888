//! Error types for staged loads.
//!
//! Every error classifies into one [`ErrorKind`]. The orchestrator decides from the
//! kind whether a table may be skipped, a statement retried, or the job aborted.

use load_core::{KeyTuple, SchemaError, TranslationError};
use std::fmt;
use thiserror::Error;

/// Boxed driver error kept as the source of [`LoadError::Database`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How an error should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or a missing prerequisite; nothing has been mutated
    Precondition,
    /// Lock timeout or dropped connection; idempotent statements may be retried
    Transient,
    /// The data itself cannot be migrated; the table fails, later tables proceed
    DataShape,
    /// The job cannot continue
    Fatal,
    /// Stop or abort was requested
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::Transient => "transient",
            ErrorKind::DataShape => "data-shape",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Main error type for staged loads.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials for {0}")]
    MissingCredentials(String),

    #[error("No primary keys declared in table {table}")]
    NoPrimaryKey { table: String },

    #[error("Key column {column} of table {destination} has no counterpart in {source_table}")]
    MissingKeyColumn {
        column: String,
        source_table: String,
        destination: String,
    },

    #[error("Cannot clone column {column} of table {table}: {source}")]
    Translation {
        table: String,
        column: String,
        #[source]
        source: TranslationError,
    },

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("Table {0} does not exist")]
    TableMissing(String),

    #[error("Trigger on {table}: {message}")]
    Trigger { table: String, message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Table {table}, row {row}: {message}")]
    DataShape {
        table: String,
        row: usize,
        message: String,
    },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: String,
        transient: bool,
        #[source]
        source: BoxError,
    },

    #[error("Table {table}, key {key}: {source}")]
    Row {
        table: String,
        key: String,
        #[source]
        source: Box<LoadError>,
    },

    #[error("Tables failed: {}", .0.join(", "))]
    TablesFailed(Vec<String>),

    #[error("Load component {component} failed: {message}")]
    Component { component: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Execution log error: {0:#}")]
    Log(anyhow::Error),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Config(_)
            | LoadError::MissingCredentials(_)
            | LoadError::NoPrimaryKey { .. }
            | LoadError::MissingKeyColumn { .. }
            | LoadError::Translation { .. }
            | LoadError::Schema(_) => ErrorKind::Precondition,
            LoadError::Database { transient: true, .. } => ErrorKind::Transient,
            LoadError::DataShape { .. } | LoadError::TablesFailed(_) => ErrorKind::DataShape,
            LoadError::Row { source, .. } => source.kind(),
            LoadError::Cancelled => ErrorKind::Cancelled,
            LoadError::TableMissing(_)
            | LoadError::Trigger { .. }
            | LoadError::Timeout { .. }
            | LoadError::Database { .. }
            | LoadError::Component { .. }
            | LoadError::Io(_)
            | LoadError::Log(_)
            | LoadError::Internal(_) => ErrorKind::Fatal,
        }
    }

    /// Check if a retry of an idempotent statement may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Create a database error from a driver error.
    pub fn database(operation: impl Into<String>, transient: bool, source: impl Into<BoxError>) -> Self {
        LoadError::Database {
            operation: operation.into(),
            transient,
            source: source.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        LoadError::Config(message.into())
    }

    /// Attach the table and key tuple of the row being processed.
    pub fn for_row(self, table: impl Into<String>, key: &KeyTuple) -> Self {
        LoadError::Row {
            table: table.into(),
            key: key.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for staged loads.
pub type Result<T> = std::result::Result<T, LoadError>;
