//! The SQL capability interface every supported engine implements.
//!
//! A `Dialect` is pure: it renders statements and translates types but never talks
//! to a server. Engine crates provide one implementation each; the root crate pairs a
//! dialect with a driver to get a working connection.
//!
//! Catalogue statements return fixed row shapes so the caller can decode them without
//! knowing the engine:
//!
//! - `describe_columns`: [`DESCRIBE_COLUMN_TYPES`] in that order
//! - `primary_key_columns`: one text column, the key column name, in key order
//! - `database_exists` / `table_exists`: any row means "exists"
//! - `trigger_bodies`: trigger name and trigger body text

use crate::bubble::{archive_table_definition, ARCHIVE_STATUS, ARCHIVE_USER, VALID_TO};
use crate::collation::Collation;
use crate::schema::{ColumnDefinition, TableDefinition, TableRef};
use crate::types::UniversalType;
use crate::values::{Cell, Row, TypedValue, UniversalValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Engines
// ============================================================================

/// A supported database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    /// Microsoft SQL Server
    #[serde(rename = "mssql", alias = "sqlserver")]
    MicrosoftSqlServer,
    /// MySQL / MariaDB
    #[serde(rename = "mysql")]
    MySql,
    /// PostgreSQL
    #[serde(rename = "postgresql", alias = "postgres")]
    PostgreSql,
    /// Oracle
    #[serde(rename = "oracle")]
    Oracle,
}

impl Engine {
    /// Get the string representation of this engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::MicrosoftSqlServer => "mssql",
            Engine::MySql => "mysql",
            Engine::PostgreSql => "postgresql",
            Engine::Oracle => "oracle",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(Engine::MicrosoftSqlServer),
            "mysql" => Ok(Engine::MySql),
            "postgresql" | "postgres" => Ok(Engine::PostgreSql),
            "oracle" => Ok(Engine::Oracle),
            other => Err(format!("unknown database engine '{other}'")),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error translating an abstract type into an engine's SQL.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslationError {
    /// The engine has no way to store this type
    #[error("{engine} cannot express type {type_name}")]
    Unsupported { engine: Engine, type_name: String },
}

impl TranslationError {
    /// Shorthand for an unsupported type.
    pub fn unsupported(engine: Engine, column_type: &UniversalType) -> Self {
        Self::Unsupported {
            engine,
            type_name: column_type.describe(),
        }
    }
}

/// Error decoding a catalogue row.
#[derive(Debug, thiserror::Error)]
#[error("unexpected catalogue row: {0}")]
pub struct CatalogueError(pub String);

// ============================================================================
// Statements and catalogue rows
// ============================================================================

/// A SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text using the dialect's placeholder syntax
    pub sql: String,
    /// Parameters in placeholder order
    pub params: Vec<TypedValue>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<TypedValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Column types of a `describe_columns` row.
pub const DESCRIBE_COLUMN_TYPES: [UniversalType; 9] = [
    UniversalType::Text,  // column name
    UniversalType::Text,  // data type
    UniversalType::Text,  // full column type, where the engine reports one
    UniversalType::Int64, // character length
    UniversalType::Int64, // numeric precision
    UniversalType::Int64, // numeric scale
    UniversalType::Int64, // nullable (0/1)
    UniversalType::Int64, // identity (0/1)
    UniversalType::Text,  // collation
];

/// One column as the engine's catalogue describes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeColumn {
    pub name: String,
    /// Base type name (`varchar`, `int`, `numeric`)
    pub data_type: String,
    /// Full type text where the engine has it (MySQL `tinyint(1)`, `enum('a','b')`)
    pub column_type: Option<String>,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: bool,
    pub identity: bool,
    pub collation: Option<String>,
}

impl NativeColumn {
    /// Decode a row returned by `describe_columns`.
    pub fn from_row(row: &Row) -> Result<Self, CatalogueError> {
        let values: Vec<&UniversalValue> = row.iter().map(|(_, v)| v).collect();
        if values.len() < DESCRIBE_COLUMN_TYPES.len() {
            return Err(CatalogueError(format!(
                "expected {} columns, got {}",
                DESCRIBE_COLUMN_TYPES.len(),
                values.len()
            )));
        }
        let text = |i: usize| match values[i] {
            UniversalValue::Text(s) => Some(s.trim().to_string()),
            UniversalValue::Bytes(b) => Some(String::from_utf8_lossy(b).trim().to_string()),
            _ => None,
        };
        let number = |i: usize| match values[i] {
            UniversalValue::Int(n) => Some(*n),
            UniversalValue::Bool(b) => Some(i64::from(*b)),
            UniversalValue::Decimal(d) => d.trunc().to_string().parse().ok(),
            UniversalValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        };
        let name = text(0).ok_or_else(|| CatalogueError("column name is missing".to_string()))?;
        let data_type = text(1)
            .ok_or_else(|| CatalogueError(format!("data type of '{name}' is missing")))?;
        Ok(Self {
            name,
            data_type,
            column_type: text(2).filter(|s| !s.is_empty()),
            length: number(3),
            precision: number(4),
            scale: number(5),
            nullable: number(6).unwrap_or(1) != 0,
            identity: number(7).unwrap_or(0) != 0,
            collation: text(8).filter(|s| !s.is_empty()),
        })
    }
}

/// What an archive trigger must copy: every LIVE column, from `live` into `archive`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveTrigger {
    /// The LIVE table the trigger fires on
    pub live: TableRef,
    /// The `_Archive` table the trigger writes to
    pub archive: TableRef,
    /// LIVE column names in ordinal order, audit columns included
    pub columns: Vec<String>,
}

// ============================================================================
// Dialect
// ============================================================================

/// Per-engine capability interface: type translation, the DDL cloning needs, row
/// statements for diffing, and archive trigger SQL.
pub trait Dialect: Send + Sync {
    /// The engine this dialect speaks.
    fn engine(&self) -> Engine;

    /// Quote one identifier.
    fn quote_ident(&self, ident: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Fully qualified table name.
    fn qualify(&self, table: &TableRef) -> String;

    /// Concrete SQL type for an abstract type.
    fn translate_type(&self, column_type: &UniversalType) -> Result<String, TranslationError>;

    /// Abstract type for a column discovered in this engine's catalogue.
    fn to_universal_type(&self, column: &NativeColumn) -> UniversalType;

    /// Collation assumed when the catalogue reports none.
    fn default_collation(&self) -> Collation {
        Collation::engine_default(self.engine())
    }

    /// Interpret a catalogue collation name.
    fn collation(&self, name: Option<&str>) -> Collation {
        Collation::parse(name, self.engine())
    }

    // ------------------------------------------------------------------
    // Catalogue
    // ------------------------------------------------------------------

    /// Any row means the database exists.
    fn database_exists(&self, database: &str) -> Statement;

    /// Statements creating an empty database.
    fn create_database(&self, database: &str) -> Vec<String>;

    /// Statements dropping a database and everything in it.
    fn drop_database(&self, database: &str) -> Vec<String>;

    /// Any row means the table exists.
    fn table_exists(&self, table: &TableRef) -> Statement;

    /// Rows shaped as [`DESCRIBE_COLUMN_TYPES`], in ordinal order.
    fn describe_columns(&self, table: &TableRef) -> Statement;

    /// One row per primary-key column, in key order.
    fn primary_key_columns(&self, table: &TableRef) -> Statement;

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    /// COLLATE clause pinning a text column to a catalogue collation name.
    fn collate_clause(&self, collation: &str) -> String {
        format!("COLLATE {collation}")
    }

    /// Column clause for CREATE TABLE / ALTER TABLE. Text columns that carry a
    /// collation get it spelled out so the copy compares keys the same way.
    fn column_clause(&self, column: &ColumnDefinition) -> Result<String, TranslationError> {
        let sql_type = self.translate_type(&column.column_type)?;
        let null = if column.nullable { "NULL" } else { "NOT NULL" };
        let collate = match column.collation.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && column.column_type.is_string() => {
                format!(" {}", self.collate_clause(name))
            }
            _ => String::new(),
        };
        Ok(format!(
            "{} {sql_type}{collate} {null}",
            self.quote_ident(&column.name)
        ))
    }

    /// CREATE TABLE for `definition`. Discarded columns are appended after the
    /// regular columns. Identity is never cloned.
    fn create_table(
        &self,
        table: &TableRef,
        definition: &TableDefinition,
        enforce_primary_key: bool,
    ) -> Result<String, TranslationError> {
        let mut clauses = Vec::new();
        for column in definition.columns.iter().chain(definition.discarded_columns.iter()) {
            clauses.push(self.column_clause(column)?);
        }
        let keys = definition.primary_key_names();
        if enforce_primary_key && !keys.is_empty() {
            let quoted: Vec<String> = keys.iter().map(|k| self.quote_ident(k)).collect();
            clauses.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }
        Ok(format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualify(table),
            clauses.join(",\n  ")
        ))
    }

    /// ALTER TABLE adding one column.
    fn add_column(&self, table: &TableRef, column: &ColumnDefinition) -> Result<String, TranslationError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.qualify(table),
            self.column_clause(column)?
        ))
    }

    /// DROP TABLE.
    fn drop_table(&self, table: &TableRef) -> String {
        format!("DROP TABLE {}", self.qualify(table))
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    /// One row, one 64-bit integer column.
    fn count_rows(&self, table: &TableRef) -> Statement {
        Statement::new(format!("SELECT COUNT(*) FROM {}", self.qualify(table)))
    }

    /// Every row, selected columns only, in a stable order.
    fn select_rows(&self, table: &TableRef, columns: &[String], order_by: &[String]) -> Statement {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.column_list(columns),
            self.qualify(table)
        );
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.column_list(order_by));
        }
        Statement::new(sql)
    }

    /// The row whose key equals `key`, selected columns only.
    fn find_row(&self, table: &TableRef, columns: &[String], key: &[Cell]) -> Statement {
        let (predicate, params) = self.key_predicate(key, 1);
        Statement::with_params(
            format!(
                "SELECT {} FROM {} WHERE {predicate}",
                self.column_list(columns),
                self.qualify(table)
            ),
            params,
        )
    }

    /// INSERT one row. `identity_insert` is set when an engine-generated column is
    /// given an explicit value.
    fn insert_row(&self, table: &TableRef, cells: &[Cell], _identity_insert: bool) -> Statement {
        let names: Vec<String> = cells.iter().map(|c| c.column.clone()).collect();
        let placeholders: Vec<String> = (1..=cells.len()).map(|i| self.placeholder(i)).collect();
        Statement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.qualify(table),
                self.column_list(&names),
                placeholders.join(", ")
            ),
            cells.iter().map(|c| c.value.clone()).collect(),
        )
    }

    /// UPDATE the row whose key equals `key`.
    fn update_row(&self, table: &TableRef, set: &[Cell], key: &[Cell]) -> Statement {
        let assignments: Vec<String> = set
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(&c.column), self.placeholder(i + 1)))
            .collect();
        let (predicate, key_params) = self.key_predicate(key, set.len() + 1);
        let mut params: Vec<TypedValue> = set.iter().map(|c| c.value.clone()).collect();
        params.extend(key_params);
        Statement::with_params(
            format!(
                "UPDATE {} SET {} WHERE {predicate}",
                self.qualify(table),
                assignments.join(", ")
            ),
            params,
        )
    }

    /// Comma separated quoted column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `k1 = $n AND k2 = $n+1` starting at placeholder `first`.
    fn key_predicate(&self, key: &[Cell], first: usize) -> (String, Vec<TypedValue>) {
        let predicate = key
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(&c.column), self.placeholder(first + i)))
            .collect::<Vec<_>>()
            .join(" AND ");
        (predicate, key.iter().map(|c| c.value.clone()).collect())
    }

    // ------------------------------------------------------------------
    // Archive triggers
    // ------------------------------------------------------------------

    /// CREATE TABLE for the archive shadow of `live`: every LIVE column nullable and
    /// without key, then ValidTo, UserID and Status.
    fn create_archive_table(
        &self,
        archive: &TableRef,
        live: &TableDefinition,
    ) -> Result<String, TranslationError> {
        let definition = archive_table_definition(archive.table.clone(), live);
        self.create_table(archive, &definition, false)
    }

    /// Names of the triggers installed on `live`.
    fn trigger_names(&self, live: &TableRef) -> Vec<String>;

    /// Statements installing the archive trigger(s).
    fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Vec<String>;

    /// Statements removing the archive trigger(s) and any helper objects.
    fn drop_archive_trigger(&self, live: &TableRef) -> Vec<String>;

    /// Rows of (trigger name, body) for the triggers on `live`.
    fn trigger_bodies(&self, live: &TableRef) -> Statement;
}

/// Archive column list shared by every trigger body: the LIVE columns, then
/// ValidTo, UserID and Status.
pub fn archive_insert_columns(trigger: &ArchiveTrigger) -> Vec<String> {
    let mut columns = trigger.columns.clone();
    columns.extend([VALID_TO, ARCHIVE_USER, ARCHIVE_STATUS].iter().map(|c| c.to_string()));
    columns
}

/// Escape a string literal by doubling single quotes.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal ANSI dialect used to exercise the default statement builders.
    struct Ansi;

    impl Dialect for Ansi {
        fn engine(&self) -> Engine {
            Engine::PostgreSql
        }
        fn quote_ident(&self, ident: &str) -> String {
            format!("\"{ident}\"")
        }
        fn placeholder(&self, index: usize) -> String {
            format!("${index}")
        }
        fn qualify(&self, table: &TableRef) -> String {
            format!("\"{}\".\"{}\"", table.database, table.table)
        }
        fn translate_type(&self, column_type: &UniversalType) -> Result<String, TranslationError> {
            match column_type {
                UniversalType::Int32 => Ok("integer".to_string()),
                UniversalType::VarChar { length } => Ok(format!("varchar({length})")),
                UniversalType::LocalDateTime => Ok("timestamp".to_string()),
                UniversalType::Char { length } => Ok(format!("char({length})")),
                other => Err(TranslationError::unsupported(self.engine(), other)),
            }
        }
        fn to_universal_type(&self, _column: &NativeColumn) -> UniversalType {
            UniversalType::Text
        }
        fn database_exists(&self, _database: &str) -> Statement {
            Statement::new("")
        }
        fn create_database(&self, _database: &str) -> Vec<String> {
            vec![]
        }
        fn drop_database(&self, _database: &str) -> Vec<String> {
            vec![]
        }
        fn table_exists(&self, _table: &TableRef) -> Statement {
            Statement::new("")
        }
        fn describe_columns(&self, _table: &TableRef) -> Statement {
            Statement::new("")
        }
        fn primary_key_columns(&self, _table: &TableRef) -> Statement {
            Statement::new("")
        }
        fn trigger_names(&self, _live: &TableRef) -> Vec<String> {
            vec![]
        }
        fn create_archive_trigger(&self, _trigger: &ArchiveTrigger) -> Vec<String> {
            vec![]
        }
        fn drop_archive_trigger(&self, _live: &TableRef) -> Vec<String> {
            vec![]
        }
        fn trigger_bodies(&self, _live: &TableRef) -> Statement {
            Statement::new("")
        }
    }

    fn people() -> TableDefinition {
        TableDefinition::new(
            "People",
            vec![
                ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
                ColumnDefinition::new("Age", UniversalType::Int32).key(),
                ColumnDefinition::nullable("Postcode", UniversalType::varchar(10)),
            ],
        )
    }

    fn table() -> TableRef {
        TableRef::new("Clinical", None, "People")
    }

    #[test]
    fn test_create_table_with_and_without_key() {
        let strict = Ansi.create_table(&table(), &people(), true).unwrap();
        assert!(strict.contains("PRIMARY KEY (\"Name\", \"Age\")"));
        assert!(strict.contains("\"Postcode\" varchar(10) NULL"));

        let relaxed = Ansi.create_table(&table(), &people(), false).unwrap();
        assert!(!relaxed.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_create_table_keeps_text_collation() {
        let mut definition = people();
        definition.columns[0].collation = Some("und-x-icu".to_string());
        definition.columns[1].collation = Some("ignored".to_string());
        let sql = Ansi.create_table(&table(), &definition, true).unwrap();
        assert!(sql.contains("\"Name\" varchar(50) COLLATE und-x-icu NOT NULL"), "{sql}");
        assert!(sql.contains("\"Age\" integer NOT NULL"), "{sql}");
    }

    #[test]
    fn test_create_table_names_untranslatable_type() {
        let mut definition = people();
        definition
            .columns
            .push(ColumnDefinition::nullable("Blob", UniversalType::Bytes));
        let err = Ansi.create_table(&table(), &definition, true).unwrap_err();
        assert!(err.to_string().contains("bytes"));
    }

    #[test]
    fn test_update_row_numbers_placeholders_after_set() {
        let set = vec![Cell::new(
            "Postcode",
            UniversalType::varchar(10),
            UniversalValue::Text("DD1 1PS".to_string()),
        )];
        let key = vec![
            Cell::new("Name", UniversalType::varchar(50), UniversalValue::Text("Dave".to_string())),
            Cell::new("Age", UniversalType::Int32, UniversalValue::Int(18)),
        ];
        let statement = Ansi.update_row(&table(), &set, &key);
        assert_eq!(
            statement.sql,
            "UPDATE \"Clinical\".\"People\" SET \"Postcode\" = $1 WHERE \"Name\" = $2 AND \"Age\" = $3"
        );
        assert_eq!(statement.params.len(), 3);
    }

    #[test]
    fn test_archive_table_is_relaxed_and_carries_audit_columns() {
        let sql = Ansi
            .create_archive_table(&table().with_table("People_Archive"), &people())
            .unwrap();
        assert!(sql.contains("\"Name\" varchar(50) NULL"));
        assert!(sql.contains("\"ValidTo\" timestamp NULL"));
        assert!(sql.contains("\"Status\" char(1) NULL"));
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_native_column_from_row() {
        let row = Row::new()
            .with("name", UniversalValue::Text("Postcode".to_string()))
            .with("data_type", UniversalValue::Text("varchar".to_string()))
            .with("column_type", UniversalValue::Null)
            .with("length", UniversalValue::Int(10))
            .with("precision", UniversalValue::Null)
            .with("scale", UniversalValue::Null)
            .with("nullable", UniversalValue::Int(1))
            .with("identity", UniversalValue::Int(0))
            .with("collation", UniversalValue::Text("Latin1_General_CI_AS".to_string()));
        let column = NativeColumn::from_row(&row).unwrap();
        assert_eq!(column.name, "Postcode");
        assert_eq!(column.length, Some(10));
        assert!(column.nullable);
        assert!(!column.identity);
        assert_eq!(column.collation.as_deref(), Some("Latin1_General_CI_AS"));
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!("SQLServer".parse::<Engine>().unwrap(), Engine::MicrosoftSqlServer);
        assert_eq!("postgres".parse::<Engine>().unwrap(), Engine::PostgreSql);
        assert!("db2".parse::<Engine>().is_err());
    }
}
