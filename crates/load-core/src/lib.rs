//! Core types for staged-load.
//!
//! This crate provides the foundational types used across the load engine,
//! including:
//!
//! - [`UniversalType`] - Abstract column type every engine translates from
//! - [`UniversalValue`] - Engine-neutral cell values compared during diffing
//! - [`TableDefinition`] - Column list with primary-key flags, discovered from LIVE
//! - [`Bubble`] - The load stages (Raw, Staging, Live) and the Archive shadow
//! - [`BubbleNamer`] - Pure mapping from root names to per-bubble names
//! - [`Dialect`] - Per-engine SQL capability interface
//! - [`Collation`] - Case and padding rules applied when comparing text
//!
//! # Architecture
//!
//! ```text
//! load-core (this crate)
//!    │
//!    ├─── mysql-types        (Dialect + mysql_async value conversion)
//!    ├─── postgresql-types   (Dialect + tokio-postgres value conversion)
//!    ├─── mssql-types        (Dialect + tiberius value conversion)
//!    ├─── oracle-types       (Dialect only)
//!    └─── staged-load        (cloner, triggers, overwrite strategy, orchestrator)
//! ```
//!
//! # Example
//!
//! ```rust
//! use load_core::{Bubble, BubbleNamer, SuffixNamer};
//!
//! let namer = SuffixNamer;
//! assert_eq!(namer.database_name("Clinical", Bubble::Raw), "Clinical_RAW");
//! assert_eq!(namer.table_name("People", Bubble::Archive), "People_Archive");
//! ```

pub mod bubble;
pub mod collation;
pub mod dialect;
pub mod naming;
pub mod schema;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use bubble::{
    archive_audit_columns, archive_table_definition, archive_table_name, is_audit_column, live_audit_columns, Bubble,
    ARCHIVE_STATUS, ARCHIVE_SUFFIX, ARCHIVE_USER, DATA_LOAD_RUN_ID, VALID_FROM, VALID_TO,
};
pub use collation::{key_fingerprint, values_match, Collation};
pub use dialect::{
    archive_insert_columns, escape_literal, ArchiveTrigger, CatalogueError, Dialect, Engine,
    NativeColumn, Statement, TranslationError, DESCRIBE_COLUMN_TYPES,
};
pub use naming::{BubbleNamer, FixedNamer, JobScopedNamer, SuffixNamer};
pub use schema::{ColumnDefinition, SchemaError, TableDefinition, TableRef};
pub use types::UniversalType;
pub use values::{Cell, KeyTuple, Row, TypedValue, UniversalValue, ValueError};
