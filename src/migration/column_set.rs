use crate::error::{LoadError, Result};
use load_core::{is_audit_column, ColumnDefinition, TableDefinition};
use regex::Regex;

/// The same logical column on both sides of a migration.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPair {
    pub source: ColumnDefinition,
    pub destination: ColumnDefinition,
}

/// Row identity and compared columns for one (source, destination) table pair.
#[derive(Debug, Clone)]
pub struct MigrationColumnSet {
    pub source_table: String,
    pub destination_table: String,
    /// Destination key columns, each paired with its source column
    pub keys: Vec<ColumnPair>,
    /// Non-key, non-audit columns whose difference triggers an update
    pub comparison: Vec<ColumnPair>,
    /// Columns matched by the ignore pattern: copied on write, never compared
    pub ignored: Vec<ColumnPair>,
}

impl MigrationColumnSet {
    /// Resolve the column set. Fails before any data is touched when the source
    /// declares no primary key or a destination key column is missing from the source.
    pub fn resolve(
        source: &TableDefinition,
        destination: &TableDefinition,
        ignore: Option<&Regex>,
    ) -> Result<Self> {
        if source.primary_keys().is_empty() {
            return Err(LoadError::NoPrimaryKey {
                table: source.name.clone(),
            });
        }

        let key_names: Vec<String> = if destination.primary_keys().is_empty() {
            source.primary_key_names()
        } else {
            destination.primary_key_names()
        };

        let mut keys = Vec::with_capacity(key_names.len());
        for name in &key_names {
            let source_column =
                source
                    .get_column(name)
                    .ok_or_else(|| LoadError::MissingKeyColumn {
                        column: name.clone(),
                        source_table: source.name.clone(),
                        destination: destination.name.clone(),
                    })?;
            let destination_column = destination.require_column(name)?;
            keys.push(ColumnPair {
                source: source_column.clone(),
                destination: destination_column.clone(),
            });
        }

        let mut comparison = Vec::new();
        let mut ignored = Vec::new();
        for column in &destination.columns {
            if is_audit_column(&column.name) || key_names.iter().any(|k| column.is_named(k)) {
                continue;
            }
            let Some(source_column) = source.get_column(&column.name) else {
                continue;
            };
            // Surrogate identities are never diffed or copied
            if column.identity || source_column.identity {
                continue;
            }
            let pair = ColumnPair {
                source: source_column.clone(),
                destination: column.clone(),
            };
            if ignore.is_some_and(|re| re.is_match(&column.name)) {
                ignored.push(pair);
            } else {
                comparison.push(pair);
            }
        }

        Ok(Self {
            source_table: source.name.clone(),
            destination_table: destination.name.clone(),
            keys,
            comparison,
            ignored,
        })
    }

    /// Every column written to the destination: keys, compared, then ignored.
    pub fn copied(&self) -> impl Iterator<Item = &ColumnPair> {
        self.keys
            .iter()
            .chain(self.comparison.iter())
            .chain(self.ignored.iter())
    }

    /// Source-side definitions of the copied columns.
    pub fn source_columns(&self) -> Vec<ColumnDefinition> {
        self.copied().map(|p| p.source.clone()).collect()
    }

    /// Destination-side definitions of the copied columns.
    pub fn destination_columns(&self) -> Vec<ColumnDefinition> {
        self.copied().map(|p| p.destination.clone()).collect()
    }

    /// Source key column names, in key order.
    pub fn source_key_names(&self) -> Vec<String> {
        self.keys.iter().map(|p| p.source.name.clone()).collect()
    }
}
