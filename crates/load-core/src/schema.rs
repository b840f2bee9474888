//! Table definitions discovered from a LIVE catalogue and cloned into other bubbles.
//!
//! ## Type Hierarchy
//!
//! - `ColumnDefinition` - Single column metadata, including key membership and collation
//! - `TableDefinition` - Table with ordered columns plus RAW-only discarded columns
//! - `TableRef` - Where one physical copy of a table lives

use crate::types::UniversalType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Column not found in table
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Two columns share a name (case-insensitively)
    #[error("Column '{column}' appears more than once in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// A table with no columns cannot be cloned or diffed
    #[error("Table '{0}' has no columns")]
    NoColumns(String),
}

// ============================================================================
// Column and Table Definitions
// ============================================================================

/// Column definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: UniversalType,

    /// Whether this column is nullable
    #[serde(default)]
    pub nullable: bool,

    /// Whether this column is part of the primary key
    #[serde(default)]
    pub primary_key: bool,

    /// Whether the engine generates values for this column (identity / auto-increment)
    #[serde(default)]
    pub identity: bool,

    /// Collation name as reported by the catalogue, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

impl ColumnDefinition {
    /// Create a new non-null column definition.
    pub fn new(name: impl Into<String>, column_type: UniversalType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            primary_key: false,
            identity: false,
            collation: None,
        }
    }

    /// Create a new nullable column definition.
    pub fn nullable(name: impl Into<String>, column_type: UniversalType) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, column_type)
        }
    }

    /// Mark this column as part of the primary key.
    pub fn key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark this column as engine-generated.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Attach a collation.
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Table definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDefinition {
    /// Table name
    pub name: String,

    /// Column definitions in ordinal order
    pub columns: Vec<ColumnDefinition>,

    /// Columns that exist only in RAW and are dropped before STAGING
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded_columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Create a new table definition.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
            discarded_columns: Vec::new(),
        }
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    /// Check if the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Get the type of a column by name.
    pub fn get_column_type(&self, name: &str) -> Option<&UniversalType> {
        self.get_column(name).map(|c| &c.column_type)
    }

    /// Primary-key columns in ordinal order.
    pub fn primary_keys(&self) -> Vec<&ColumnDefinition> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Primary-key column names in ordinal order.
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_keys().iter().map(|c| c.name.clone()).collect()
    }

    /// Get all column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check names are unique and the table is not empty.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns(self.name.clone()));
        }
        let all = self.columns.iter().chain(self.discarded_columns.iter());
        for (i, column) in all.clone().enumerate() {
            if all.clone().skip(i + 1).any(|other| other.is_named(&column.name)) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up a column or report which table lacks it.
    pub fn require_column(&self, name: &str) -> Result<&ColumnDefinition, SchemaError> {
        self.get_column(name).ok_or_else(|| SchemaError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }
}

// ============================================================================
// Physical Location
// ============================================================================

/// One physical table: database, optional schema, and table name.
///
/// The database part is what bubble naming rewrites; on PostgreSQL and Oracle it
/// is realised as a schema / user because those engines cannot query across
/// databases from one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Database name
    pub database: String,
    /// Schema name (e.g. `dbo`) where the engine has one below the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Table name
    pub table: String,
}

impl TableRef {
    /// Create a new table reference.
    pub fn new(database: impl Into<String>, schema: Option<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema,
            table: table.into(),
        }
    }

    /// The same table name in another database.
    pub fn in_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: self.schema.clone(),
            table: self.table.clone(),
        }
    }

    /// The same database with another table name.
    pub fn with_table(&self, table: impl Into<String>) -> Self {
        Self {
            database: self.database.clone(),
            schema: self.schema.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}.{}", self.database, schema, self.table),
            None => write!(f, "{}.{}", self.database, self.table),
        }
    }
}
