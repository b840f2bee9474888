//! In-memory `Database`.
//!
//! Behaves like a single server: databases hold tables, tables created with an
//! enforced primary key reject duplicate keys, NOT NULL columns reject NULLs, and an
//! installed archive trigger copies the old row image into the `_Archive` table on
//! every update and delete. Faults can be injected per operation to exercise retry
//! and failure handling.

use crate::database::Database;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use chrono::Utc;
use load_core::{
    archive_table_definition, key_fingerprint, values_match, ArchiveTrigger, Cell, ColumnDefinition,
    Dialect, Engine, Row, TableDefinition, TableRef, UniversalValue, ARCHIVE_STATUS, ARCHIVE_USER,
    VALID_TO,
};
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    Ping,
    ReadRows,
    FindRow,
    InsertRow,
    UpdateRow,
    CreateTrigger,
}

impl MemoryOp {
    fn as_str(&self) -> &'static str {
        match self {
            MemoryOp::Ping => "ping",
            MemoryOp::ReadRows => "read rows",
            MemoryOp::FindRow => "find row",
            MemoryOp::InsertRow => "insert row",
            MemoryOp::UpdateRow => "update row",
            MemoryOp::CreateTrigger => "create archive trigger",
        }
    }
}

#[derive(Debug)]
struct Fault {
    op: MemoryOp,
    table: Option<String>,
    remaining: usize,
    transient: bool,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    enforce_primary_key: bool,
    rows: Vec<Row>,
    next_identity: i64,
}

#[derive(Debug, Clone)]
struct InstalledTrigger {
    spec: Option<ArchiveTrigger>,
    bodies: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeSet<String>,
    tables: BTreeMap<String, MemoryTable>,
    triggers: BTreeMap<String, InstalledTrigger>,
    faults: Vec<Fault>,
    trigger_delay: Option<Duration>,
    statements: usize,
}

/// A database server held in memory.
pub struct MemoryDatabase {
    dialect: Box<dyn Dialect>,
    name: String,
    user: String,
    state: Mutex<State>,
}

fn database_key(database: &str) -> String {
    database.to_lowercase()
}

fn table_key(table: &TableRef) -> String {
    format!(
        "{}.{}.{}",
        table.database.to_lowercase(),
        table.schema.as_deref().unwrap_or("").to_lowercase(),
        table.table.to_lowercase()
    )
}

fn failure(operation: &str, message: impl Into<String>) -> LoadError {
    let message: String = message.into();
    LoadError::database(operation, false, message)
}

impl MemoryDatabase {
    /// An empty server speaking `engine`'s dialect.
    pub fn new(engine: Engine) -> Self {
        Self {
            dialect: crate::database::dialect_for(engine),
            name: format!("memory-{engine}"),
            user: "memory".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Rename the server in log lines and test assertions.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` calls of `op` (optionally only on `table`) fail.
    pub fn fail_next(&self, op: MemoryOp, table: Option<&str>, times: usize, transient: bool) {
        self.state().faults.push(Fault {
            op,
            table: table.map(str::to_string),
            remaining: times,
            transient,
        });
    }

    /// Make trigger creation block for `delay`, as DDL waiting on a lock would.
    pub fn delay_trigger_creation(&self, delay: Duration) {
        self.state().trigger_delay = Some(delay);
    }

    /// Replace the trigger on `live` with an arbitrary body.
    pub fn install_trigger_body(&self, live: &TableRef, name: &str, body: &str) {
        self.state().triggers.insert(
            table_key(live),
            InstalledTrigger {
                spec: None,
                bodies: vec![(name.to_string(), body.to_string())],
            },
        );
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &TableRef) -> Vec<Row> {
        self.state()
            .tables
            .get(&table_key(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Names of the databases on this server.
    pub fn databases(&self) -> Vec<String> {
        self.state().databases.iter().cloned().collect()
    }

    /// Number of mutating statements run so far.
    pub fn statement_count(&self) -> usize {
        self.state().statements
    }

    /// Delete the rows whose key equals `key`, firing the archive trigger.
    pub fn delete_row(&self, table: &TableRef, key: &[Cell]) -> Result<u64> {
        let mut state = self.state();
        state.statements += 1;
        let matched = Self::matching_rows(&*self.dialect, &state, table, key)?;
        let old: Vec<Row> = {
            let Some(stored) = state.tables.get(&table_key(table)) else {
                return Err(LoadError::TableMissing(table.to_string()));
            };
            matched.iter().map(|i| stored.rows[*i].clone()).collect()
        };
        for row in &old {
            self.fire_trigger(&mut state, table, row, "D")?;
        }
        if let Some(stored) = state.tables.get_mut(&table_key(table)) {
            let mut index = 0;
            stored.rows.retain(|_| {
                let keep = !matched.contains(&index);
                index += 1;
                keep
            });
        }
        Ok(old.len() as u64)
    }

    fn check_fault(&self, op: MemoryOp, table: Option<&TableRef>) -> Result<()> {
        let mut state = self.state();
        let fault = state.faults.iter_mut().find(|f| {
            f.op == op
                && f.remaining > 0
                && match (&f.table, table) {
                    (None, _) => true,
                    (Some(name), Some(t)) => name.eq_ignore_ascii_case(&t.table),
                    (Some(_), None) => false,
                }
        });
        match fault {
            Some(fault) => {
                fault.remaining -= 1;
                let message = if fault.transient {
                    "injected fault: lock request time out period exceeded"
                } else {
                    "injected fault"
                };
                Err(LoadError::database(op.as_str(), fault.transient, message))
            }
            None => Ok(()),
        }
    }

    fn key_matches(dialect: &dyn Dialect, definition: &TableDefinition, row: &Row, key: &[Cell]) -> bool {
        key.iter().all(|cell| {
            let collation = dialect.collation(
                definition
                    .get_column(&cell.column)
                    .and_then(|c| c.collation.as_deref()),
            );
            let stored = row.get(&cell.column).unwrap_or(&UniversalValue::Null);
            !stored.is_null() && values_match(&cell.value.value, stored, &collation)
        })
    }

    fn matching_rows(dialect: &dyn Dialect, state: &State, table: &TableRef, key: &[Cell]) -> Result<Vec<usize>> {
        let stored = state
            .tables
            .get(&table_key(table))
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        Ok(stored
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| Self::key_matches(dialect, &stored.definition, row, key))
            .map(|(i, _)| i)
            .collect())
    }

    /// Copy `old` into the archive table when a trigger is installed on `live`.
    fn fire_trigger(&self, state: &mut State, live: &TableRef, old: &Row, status: &str) -> Result<()> {
        let Some(spec) = state
            .triggers
            .get(&table_key(live))
            .and_then(|t| t.spec.clone())
        else {
            return Ok(());
        };
        let archive = state.tables.get_mut(&table_key(&spec.archive)).ok_or_else(|| {
            failure(
                "archive trigger",
                format!("invalid object name {}", spec.archive),
            )
        })?;
        let mut row = Row::new();
        for column in &spec.columns {
            row.set(
                column.clone(),
                old.get(column).cloned().unwrap_or(UniversalValue::Null),
            );
        }
        row.set(VALID_TO, UniversalValue::DateTime(Utc::now().naive_utc()));
        row.set(ARCHIVE_USER, UniversalValue::Text(self.user.clone()));
        row.set(ARCHIVE_STATUS, UniversalValue::Text(status.to_string()));
        archive.rows.push(row);
        Ok(())
    }

    fn project(row: &Row, columns: &[ColumnDefinition]) -> Row {
        columns.iter().fold(Row::new(), |projected, column| {
            projected.with(
                column.name.clone(),
                row.get(&column.name).cloned().unwrap_or(UniversalValue::Null),
            )
        })
    }
}

fn compare_values(a: &UniversalValue, b: &UniversalValue) -> Ordering {
    use UniversalValue as V;
    let number = |v: &UniversalValue| match v {
        V::Int(i) => Some(*i as f64),
        V::Float(f) => Some(*f),
        V::Decimal(d) => d.to_f64(),
        _ => None,
    };
    match (a, b) {
        (V::Null, V::Null) => Ordering::Equal,
        (V::Null, _) => Ordering::Less,
        (_, V::Null) => Ordering::Greater,
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn ping(&self) -> Result<()> {
        self.check_fault(MemoryOp::Ping, None)
    }

    async fn database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.state().databases.contains(&database_key(database)))
    }

    async fn create_database(&self, database: &str) -> Result<()> {
        let mut state = self.state();
        state.statements += 1;
        if !state.databases.insert(database_key(database)) {
            return Err(failure(
                "create database",
                format!("database {database} already exists"),
            ));
        }
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        let mut state = self.state();
        state.statements += 1;
        let key = database_key(database);
        if !state.databases.remove(&key) {
            return Err(failure(
                "drop database",
                format!("database {database} does not exist"),
            ));
        }
        let prefix = format!("{key}.");
        state.tables.retain(|k, _| !k.starts_with(&prefix));
        state.triggers.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.state().tables.contains_key(&table_key(table)))
    }

    async fn describe_table(&self, table: &TableRef) -> Result<TableDefinition> {
        let state = self.state();
        let stored = state
            .tables
            .get(&table_key(table))
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        Ok(TableDefinition::new(
            table.table.clone(),
            stored.definition.columns.clone(),
        ))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        definition: &TableDefinition,
        enforce_primary_key: bool,
    ) -> Result<()> {
        for column in definition.columns.iter().chain(&definition.discarded_columns) {
            self.dialect
                .translate_type(&column.column_type)
                .map_err(|e| LoadError::Translation {
                    table: table.to_string(),
                    column: column.name.clone(),
                    source: e,
                })?;
        }

        let mut state = self.state();
        state.statements += 1;
        if !state.databases.contains(&database_key(&table.database)) {
            return Err(failure(
                "create table",
                format!("database {} does not exist", table.database),
            ));
        }
        let key = table_key(table);
        if state.tables.contains_key(&key) {
            return Err(failure("create table", format!("table {table} already exists")));
        }
        let columns = definition
            .columns
            .iter()
            .chain(&definition.discarded_columns)
            .map(|c| ColumnDefinition {
                primary_key: c.primary_key && enforce_primary_key,
                ..c.clone()
            })
            .collect();
        state.tables.insert(
            key,
            MemoryTable {
                definition: TableDefinition::new(table.table.clone(), columns),
                enforce_primary_key,
                rows: Vec::new(),
                next_identity: 1,
            },
        );
        Ok(())
    }

    async fn add_column(&self, table: &TableRef, column: &ColumnDefinition) -> Result<()> {
        let mut state = self.state();
        state.statements += 1;
        let stored = state
            .tables
            .get_mut(&table_key(table))
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        if stored.definition.has_column(&column.name) {
            return Err(failure(
                "add column",
                format!("column {} already exists in {table}", column.name),
            ));
        }
        stored.definition.columns.push(column.clone());
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        let mut state = self.state();
        state.statements += 1;
        let key = table_key(table);
        state
            .tables
            .remove(&key)
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        state.triggers.remove(&key);
        Ok(())
    }

    async fn count_rows(&self, table: &TableRef) -> Result<u64> {
        let state = self.state();
        state
            .tables
            .get(&table_key(table))
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))
    }

    async fn read_rows(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        order_by: &[String],
    ) -> Result<Vec<Row>> {
        self.check_fault(MemoryOp::ReadRows, Some(table))?;
        let state = self.state();
        let stored = state
            .tables
            .get(&table_key(table))
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        let mut rows: Vec<Row> = stored.rows.iter().map(|r| Self::project(r, columns)).collect();
        rows.sort_by(|a, b| {
            order_by
                .iter()
                .map(|column| {
                    compare_values(
                        a.get(column).unwrap_or(&UniversalValue::Null),
                        b.get(column).unwrap_or(&UniversalValue::Null),
                    )
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(rows)
    }

    async fn find_row(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        key: &[Cell],
    ) -> Result<Option<Row>> {
        self.check_fault(MemoryOp::FindRow, Some(table))?;
        let state = self.state();
        let matched = Self::matching_rows(&*self.dialect, &state, table, key)?;
        Ok(matched.first().and_then(|i| {
            state
                .tables
                .get(&table_key(table))
                .map(|t| Self::project(&t.rows[*i], columns))
        }))
    }

    async fn insert_row(&self, table: &TableRef, cells: &[Cell], identity_insert: bool) -> Result<u64> {
        self.check_fault(MemoryOp::InsertRow, Some(table))?;
        let mut state = self.state();
        state.statements += 1;
        let dialect = &*self.dialect;
        let stored = state
            .tables
            .get_mut(&table_key(table))
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;

        let mut row = Row::new();
        for cell in cells {
            let column = stored.definition.get_column(&cell.column).ok_or_else(|| {
                failure(
                    "insert row",
                    format!("invalid column name {} in {table}", cell.column),
                )
            })?;
            if column.identity && !identity_insert {
                return Err(failure(
                    "insert row",
                    format!("cannot insert explicit value for identity column {}", column.name),
                ));
            }
            row.set(column.name.clone(), cell.value.value.clone());
        }

        for column in &stored.definition.columns {
            if row.get(&column.name).is_none() {
                let value = if column.identity {
                    UniversalValue::Int(stored.next_identity)
                } else {
                    UniversalValue::Null
                };
                row.set(column.name.clone(), value);
            }
            if let (true, Some(UniversalValue::Int(i))) = (column.identity, row.get(&column.name)) {
                stored.next_identity = stored.next_identity.max(i + 1);
            }
            if !column.nullable && row.get(&column.name).is_some_and(UniversalValue::is_null) {
                return Err(failure(
                    "insert row",
                    format!("cannot insert NULL into {}.{}", table, column.name),
                ));
            }
        }

        if stored.enforce_primary_key {
            let keys = stored.definition.primary_keys();
            if !keys.is_empty() {
                let fingerprint = |r: &Row| -> Vec<String> {
                    keys.iter()
                        .map(|k| {
                            key_fingerprint(
                                r.get(&k.name).unwrap_or(&UniversalValue::Null),
                                &dialect.collation(k.collation.as_deref()),
                            )
                        })
                        .collect()
                };
                let new_key = fingerprint(&row);
                let existing: HashSet<Vec<String>> = stored.rows.iter().map(fingerprint).collect();
                if existing.contains(&new_key) {
                    return Err(failure(
                        "insert row",
                        format!("violation of PRIMARY KEY constraint on {table}"),
                    ));
                }
            }
        }

        stored.rows.push(row);
        Ok(1)
    }

    async fn update_row(&self, table: &TableRef, set: &[Cell], key: &[Cell]) -> Result<u64> {
        self.check_fault(MemoryOp::UpdateRow, Some(table))?;
        let mut state = self.state();
        state.statements += 1;
        let matched = Self::matching_rows(&*self.dialect, &state, table, key)?;
        let definition = state
            .tables
            .get(&table_key(table))
            .map(|t| t.definition.clone())
            .ok_or_else(|| LoadError::TableMissing(table.to_string()))?;
        for cell in set {
            let column = definition.get_column(&cell.column).ok_or_else(|| {
                failure(
                    "update row",
                    format!("invalid column name {} in {table}", cell.column),
                )
            })?;
            if !column.nullable && cell.value.value.is_null() {
                return Err(failure(
                    "update row",
                    format!("cannot update {}.{} to NULL", table, column.name),
                ));
            }
        }

        for index in &matched {
            let old = match state.tables.get(&table_key(table)) {
                Some(stored) => stored.rows[*index].clone(),
                None => return Err(LoadError::TableMissing(table.to_string())),
            };
            self.fire_trigger(&mut state, table, &old, "U")?;
            if let Some(stored) = state.tables.get_mut(&table_key(table)) {
                for cell in set {
                    stored.rows[*index].set(cell.column.clone(), cell.value.value.clone());
                }
            }
        }
        Ok(matched.len() as u64)
    }

    async fn create_archive_table(&self, archive: &TableRef, live: &TableDefinition) -> Result<()> {
        let definition = archive_table_definition(archive.table.clone(), live);
        self.create_table(archive, &definition, false).await
    }

    async fn trigger_bodies(&self, live: &TableRef) -> Result<Vec<(String, String)>> {
        Ok(self
            .state()
            .triggers
            .get(&table_key(live))
            .map(|t| t.bodies.clone())
            .unwrap_or_default())
    }

    async fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Result<()> {
        self.check_fault(MemoryOp::CreateTrigger, Some(&trigger.live))?;
        let delay = self.state().trigger_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.statements += 1;
        if !state.tables.contains_key(&table_key(&trigger.live)) {
            return Err(LoadError::TableMissing(trigger.live.to_string()));
        }
        if !state.tables.contains_key(&table_key(&trigger.archive)) {
            return Err(failure(
                "create archive trigger",
                format!("invalid object name {}", trigger.archive),
            ));
        }
        let body = self.dialect.create_archive_trigger(trigger).join("\n");
        let bodies = self
            .dialect
            .trigger_names(&trigger.live)
            .into_iter()
            .map(|name| (name, body.clone()))
            .collect();
        state.triggers.insert(
            table_key(&trigger.live),
            InstalledTrigger {
                spec: Some(trigger.clone()),
                bodies,
            },
        );
        Ok(())
    }

    async fn drop_archive_trigger(&self, live: &TableRef) -> Result<Vec<String>> {
        let mut state = self.state();
        state.statements += 1;
        state.triggers.remove(&table_key(live));
        Ok(self
            .dialect
            .drop_archive_trigger(live)
            .into_iter()
            .map(|sql| format!("Ran: {sql}"))
            .collect())
    }
}
