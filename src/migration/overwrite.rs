//! Overwrite-by-diff: insert new keys, update changed rows, leave the rest alone.
//!
//! Rows are processed one statement at a time in source key order. A failure part
//! way through leaves the rows already written in place; the next run diffs them as
//! unchanged, so re-running never double-applies.

use super::column_set::{ColumnPair, MigrationColumnSet};
use crate::database::Database;
use crate::error::{LoadError, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use load_core::{
    key_fingerprint, values_match, Cell, ColumnDefinition, KeyTuple, Row, TableDefinition,
    TableRef, UniversalType, UniversalValue, DATA_LOAD_RUN_ID, VALID_FROM,
};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one table pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationOutcome {
    pub table: String,
    pub inserts: u64,
    pub updates: u64,
    pub unchanged: u64,
    pub duplicate_keys: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// Abort was honoured mid-table; the rows processed so far need manual review
    pub partial: bool,
}

/// Diffs a source table into a destination table by primary key.
pub struct OverwriteStrategy<'a> {
    source_db: &'a dyn Database,
    destination_db: &'a dyn Database,
    job_id: i64,
    retries: u32,
    abort: CancellationToken,
}

impl<'a> OverwriteStrategy<'a> {
    pub fn new(
        source_db: &'a dyn Database,
        destination_db: &'a dyn Database,
        job_id: i64,
        abort: CancellationToken,
    ) -> Self {
        Self {
            source_db,
            destination_db,
            job_id,
            retries: 3,
            abort,
        }
    }

    /// Retry transient failures of the existence lookup up to `retries` times.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Migrate every row of `source` into `destination`. `valid_from` stamps inserted
    /// and updated rows.
    pub async fn migrate(
        &self,
        columns: &MigrationColumnSet,
        source: &TableRef,
        destination: &TableRef,
        destination_def: &TableDefinition,
        valid_from: NaiveDateTime,
    ) -> Result<MigrationOutcome> {
        let started = Utc::now();
        let mut outcome = MigrationOutcome {
            table: destination.to_string(),
            inserts: 0,
            updates: 0,
            unchanged: 0,
            duplicate_keys: 0,
            started,
            finished: started,
            partial: false,
        };

        let rows = self
            .source_db
            .read_rows(source, &columns.source_columns(), &columns.source_key_names())
            .await?;
        debug!("Read {} rows from {source}", rows.len());

        let run_id_column = destination_def.get_column(DATA_LOAD_RUN_ID).cloned();
        let valid_from_column = destination_def.get_column(VALID_FROM).cloned();
        let mut lookup_columns = columns.destination_columns();
        if let Some(column) = &valid_from_column {
            lookup_columns.push(column.clone());
        }
        let identity_insert = columns.keys.iter().any(|p| p.destination.identity);
        let dialect = self.destination_db.dialect();

        let mut seen = HashSet::new();
        for (index, row) in rows.iter().enumerate() {
            if self.abort.is_cancelled() {
                warn!(
                    "Abort requested during {destination} after {index} of {} rows; table is partially migrated",
                    rows.len()
                );
                outcome.partial = true;
                break;
            }
            let position = index + 1;

            let key = KeyTuple(
                columns
                    .keys
                    .iter()
                    .map(|p| source_value(row, &p.source))
                    .collect(),
            );
            if key.has_null() {
                return Err(LoadError::DataShape {
                    table: destination.to_string(),
                    row: position,
                    message: format!("primary key {key} contains NULL"),
                });
            }

            let fingerprint: Vec<String> = columns
                .keys
                .iter()
                .zip(&key.0)
                .map(|(p, v)| key_fingerprint(v, &dialect.collation(p.destination.collation.as_deref())))
                .collect();
            if !seen.insert(fingerprint) {
                outcome.duplicate_keys += 1;
                warn!("Duplicate key {key} in {source}, row {position}; the last row wins");
            }

            let key_cells = columns
                .keys
                .iter()
                .map(|p| to_cell(p, row, destination, position))
                .collect::<Result<Vec<_>>>()?;

            let existing = self
                .find_with_retry(destination, &lookup_columns, &key_cells)
                .await
                .map_err(|e| e.for_row(destination.to_string(), &key))?;

            match existing {
                None => {
                    let mut cells = key_cells;
                    for pair in columns.comparison.iter().chain(&columns.ignored) {
                        cells.push(to_cell(pair, row, destination, position)?);
                    }
                    if let Some(column) = &run_id_column {
                        cells.push(self.run_id_cell(column));
                    }
                    if let Some(column) = &valid_from_column {
                        cells.push(stamp_cell(column, valid_from));
                    }
                    self.destination_db
                        .insert_row(destination, &cells, identity_insert)
                        .await
                        .map_err(|e| e.for_row(destination.to_string(), &key))?;
                    outcome.inserts += 1;
                }
                Some(current) => {
                    let mut set = Vec::new();
                    let mut changed = false;
                    for pair in &columns.comparison {
                        let cell = to_cell(pair, row, destination, position)?;
                        let collation = dialect.collation(pair.destination.collation.as_deref());
                        let stored = current
                            .get(&pair.destination.name)
                            .unwrap_or(&UniversalValue::Null);
                        if !values_match(&cell.value.value, stored, &collation) {
                            debug!("{destination} {key}: {} changed", pair.destination.name);
                            changed = true;
                        }
                        set.push(cell);
                    }
                    if !changed {
                        outcome.unchanged += 1;
                        continue;
                    }
                    for pair in &columns.ignored {
                        set.push(to_cell(pair, row, destination, position)?);
                    }
                    if let Some(column) = &run_id_column {
                        set.push(self.run_id_cell(column));
                    }
                    if let Some(column) = &valid_from_column {
                        let stamp = next_valid_from(valid_from, current.get(&column.name));
                        set.push(stamp_cell(column, stamp));
                    }
                    self.destination_db
                        .update_row(destination, &set, &key_cells)
                        .await
                        .map_err(|e| e.for_row(destination.to_string(), &key))?;
                    outcome.updates += 1;
                }
            }
        }

        outcome.finished = Utc::now();
        info!(
            "Migrated {source} into {destination} for job {}: {} inserts, {} updates, {} unchanged",
            self.job_id, outcome.inserts, outcome.updates, outcome.unchanged
        );
        Ok(outcome)
    }

    /// The existence lookup is idempotent, so transient failures are retried with a
    /// short linear backoff. Writes are never retried.
    async fn find_with_retry(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        key: &[Cell],
    ) -> Result<Option<Row>> {
        let mut attempt = 0;
        loop {
            match self.destination_db.find_row(table, columns, key).await {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!("Lookup in {table} failed ({e}), retry {attempt}/{}", self.retries);
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                result => return result,
            }
        }
    }

    fn run_id_cell(&self, column: &ColumnDefinition) -> Cell {
        Cell::new(
            column.name.clone(),
            column.column_type.clone(),
            UniversalValue::Int(self.job_id),
        )
    }
}

fn source_value(row: &Row, column: &ColumnDefinition) -> UniversalValue {
    row.get(&column.name).cloned().unwrap_or(UniversalValue::Null)
}

/// The source value of `pair`, shaped for the destination column.
fn to_cell(pair: &ColumnPair, row: &Row, destination: &TableRef, position: usize) -> Result<Cell> {
    let value = source_value(row, &pair.source)
        .coerce(&pair.destination.column_type)
        .map_err(|e| LoadError::DataShape {
            table: destination.to_string(),
            row: position,
            message: format!("column {}: {e}", pair.destination.name),
        })?;
    Ok(Cell::new(
        pair.destination.name.clone(),
        pair.destination.column_type.clone(),
        value,
    ))
}

fn stamp_cell(column: &ColumnDefinition, stamp: NaiveDateTime) -> Cell {
    let value = match column.column_type {
        UniversalType::ZonedDateTime => UniversalValue::DateTimeTz(stamp.and_utc()),
        _ => UniversalValue::DateTime(stamp),
    };
    Cell::new(column.name.clone(), column.column_type.clone(), value)
}

/// `ValidFrom` must strictly increase on every update, even when the clock has not
/// moved past the previous stamp.
fn next_valid_from(valid_from: NaiveDateTime, previous: Option<&UniversalValue>) -> NaiveDateTime {
    let previous = match previous {
        Some(UniversalValue::DateTime(dt)) => Some(*dt),
        Some(UniversalValue::DateTimeTz(dt)) => Some(dt.naive_utc()),
        _ => None,
    };
    match previous {
        Some(previous) if previous >= valid_from => previous + ChronoDuration::microseconds(1),
        _ => valid_from,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDatabase, MemoryOp};
    use chrono::NaiveDate;
    use load_core::Engine;

    fn people() -> TableDefinition {
        TableDefinition::new(
            "People",
            vec![
                ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
                ColumnDefinition::new("Age", UniversalType::Int32).key(),
                ColumnDefinition::nullable("Postcode", UniversalType::varchar(10)),
                ColumnDefinition::nullable(DATA_LOAD_RUN_ID, UniversalType::Int32),
                ColumnDefinition::nullable(VALID_FROM, UniversalType::LocalDateTime),
            ],
        )
    }

    fn text(s: &str) -> UniversalValue {
        UniversalValue::Text(s.to_string())
    }

    fn stamp(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    async fn setup() -> (MemoryDatabase, TableRef, TableRef) {
        let db = MemoryDatabase::new(Engine::MicrosoftSqlServer);
        db.create_database("Clinical").await.unwrap();
        db.create_database("Clinical_STAGING").await.unwrap();
        let live = TableRef::new("Clinical", Some("dbo".into()), "People");
        let staging = live.in_database("Clinical_STAGING");
        db.create_table(&live, &people(), true).await.unwrap();
        db.create_table(&staging, &people(), true).await.unwrap();
        (db, staging, live)
    }

    async fn put(db: &MemoryDatabase, table: &TableRef, name: &str, age: i64, postcode: Option<&str>) {
        let cells = vec![
            Cell::new("Name", UniversalType::varchar(50), text(name)),
            Cell::new("Age", UniversalType::Int32, UniversalValue::Int(age)),
            Cell::new(
                "Postcode",
                UniversalType::varchar(10),
                postcode.map(text).unwrap_or(UniversalValue::Null),
            ),
        ];
        db.insert_row(table, &cells, false).await.unwrap();
    }

    #[test]
    fn test_next_valid_from_strictly_increases() {
        assert_eq!(next_valid_from(stamp(10), None), stamp(10));
        assert_eq!(
            next_valid_from(stamp(10), Some(&UniversalValue::DateTime(stamp(9)))),
            stamp(10)
        );
        assert_eq!(
            next_valid_from(stamp(10), Some(&UniversalValue::DateTime(stamp(10)))),
            stamp(10) + ChronoDuration::microseconds(1)
        );
    }

    #[tokio::test]
    async fn test_insert_update_unchanged() {
        let (db, staging, live) = setup().await;
        put(&db, &live, "Dave", 18, Some("DD3 1AB")).await;
        put(&db, &live, "Mango", 32, None).await;
        put(&db, &staging, "Dave", 18, Some("DD1 1PS")).await;
        put(&db, &staging, "Chutney", 32, None).await;
        put(&db, &staging, "Mango", 32, None).await;

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let strategy = OverwriteStrategy::new(&db, &db, 7, CancellationToken::new());
        let outcome = strategy
            .migrate(&columns, &staging, &live, &people(), stamp(10))
            .await
            .unwrap();
        assert_eq!((outcome.inserts, outcome.updates, outcome.unchanged), (1, 1, 1));
        assert!(!outcome.partial);

        let rows = db.rows(&live);
        let mango = rows.iter().find(|r| r.get("Name") == Some(&text("Mango"))).unwrap();
        assert_eq!(mango.get(DATA_LOAD_RUN_ID), Some(&UniversalValue::Null));
        let dave = rows.iter().find(|r| r.get("Name") == Some(&text("Dave"))).unwrap();
        assert_eq!(dave.get(DATA_LOAD_RUN_ID), Some(&UniversalValue::Int(7)));
        assert_eq!(dave.get(VALID_FROM), Some(&UniversalValue::DateTime(stamp(10))));

        let again = strategy
            .migrate(&columns, &staging, &live, &people(), stamp(11))
            .await
            .unwrap();
        assert_eq!((again.inserts, again.updates, again.unchanged), (0, 0, 3));
    }

    #[tokio::test]
    async fn test_case_only_difference_is_not_a_change_under_ci_collation() {
        let (db, staging, live) = setup().await;
        put(&db, &live, "Dave", 18, Some("DD3 1AB")).await;
        put(&db, &staging, "Dave", 18, Some("dd3 1ab ")).await;

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let outcome = OverwriteStrategy::new(&db, &db, 1, CancellationToken::new())
            .migrate(&columns, &staging, &live, &people(), stamp(10))
            .await
            .unwrap();
        assert_eq!(outcome.updates, 0);
        assert_eq!(outcome.unchanged, 1);
    }

    #[tokio::test]
    async fn test_null_key_is_data_shape_error() {
        let (db, _, live) = setup().await;
        let raw = live.in_database("Clinical_RAW");
        db.create_database("Clinical_RAW").await.unwrap();
        let mut relaxed = people();
        relaxed.columns.iter_mut().for_each(|c| c.nullable = true);
        db.create_table(&raw, &relaxed, false).await.unwrap();
        db.insert_row(
            &raw,
            &[Cell::new("Name", UniversalType::varchar(50), text("Dave"))],
            false,
        )
        .await
        .unwrap();

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let err = OverwriteStrategy::new(&db, &db, 1, CancellationToken::new())
            .migrate(&columns, &raw, &live, &people(), stamp(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataShape);
        assert!(err.to_string().contains("(Dave, NULL)"), "{err}");
    }

    #[tokio::test]
    async fn test_transient_lookup_failures_are_retried() {
        let (db, staging, live) = setup().await;
        put(&db, &staging, "Dave", 18, None).await;
        db.fail_next(MemoryOp::FindRow, Some("People"), 2, true);

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let outcome = OverwriteStrategy::new(&db, &db, 1, CancellationToken::new())
            .migrate(&columns, &staging, &live, &people(), stamp(10))
            .await
            .unwrap();
        assert_eq!(outcome.inserts, 1);
    }

    #[tokio::test]
    async fn test_failure_names_table_and_key() {
        let (db, staging, live) = setup().await;
        put(&db, &staging, "Dave", 18, None).await;
        db.fail_next(MemoryOp::InsertRow, Some("People"), 1, true);

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let err = OverwriteStrategy::new(&db, &db, 1, CancellationToken::new())
            .migrate(&columns, &staging, &live, &people(), stamp(10))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Clinical.dbo.People"), "{message}");
        assert!(message.contains("(Dave, 18)"), "{message}");
        assert_eq!(db.count_rows(&live).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_abort_flags_partial() {
        let (db, staging, live) = setup().await;
        put(&db, &staging, "Dave", 18, None).await;
        let abort = CancellationToken::new();
        abort.cancel();

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let outcome = OverwriteStrategy::new(&db, &db, 1, abort)
            .migrate(&columns, &staging, &live, &people(), stamp(10))
            .await
            .unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.inserts, 0);
    }

    #[tokio::test]
    async fn test_duplicate_source_keys_last_write_wins() {
        let (db, _, live) = setup().await;
        let raw = live.in_database("Clinical_RAW");
        db.create_database("Clinical_RAW").await.unwrap();
        db.create_table(&raw, &people(), false).await.unwrap();
        put(&db, &raw, "Dave", 18, Some("DD3 1AB")).await;
        put(&db, &raw, "Dave", 18, Some("DD1 1PS")).await;

        let columns = MigrationColumnSet::resolve(&people(), &people(), None).unwrap();
        let outcome = OverwriteStrategy::new(&db, &db, 1, CancellationToken::new())
            .migrate(&columns, &raw, &live, &people(), stamp(10))
            .await
            .unwrap();
        assert_eq!(outcome.duplicate_keys, 1);
        assert_eq!((outcome.inserts, outcome.updates), (1, 1));
        let rows = db.rows(&live);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Postcode"), Some(&text("DD1 1PS")));
    }
}
