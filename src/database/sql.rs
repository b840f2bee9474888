//! `Database` on top of a dialect and a minimal SQL client.

use super::Database;
use crate::error::{LoadError, Result};
use async_trait::async_trait;
use load_core::{
    ArchiveTrigger, Cell, ColumnDefinition, Dialect, NativeColumn, Row, Statement, TableDefinition,
    TableRef, TypedValue, UniversalType, UniversalValue, DESCRIBE_COLUMN_TYPES,
};
use tracing::debug;

/// The two calls every driver must provide.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Execute a statement, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[TypedValue]) -> anyhow::Result<u64>;

    /// Run a query, decoding column `i` as `column_types[i]`.
    async fn query(
        &self,
        sql: &str,
        params: &[TypedValue],
        column_types: &[UniversalType],
    ) -> anyhow::Result<Vec<Vec<UniversalValue>>>;

    /// Whether an error from this driver is worth retrying.
    fn is_transient(&self, err: &anyhow::Error) -> bool;

    /// Server description safe to log.
    fn describe(&self) -> String;
}

/// A server reached through `C`, speaking the SQL of `dialect`.
pub struct SqlDatabase<C> {
    client: C,
    dialect: Box<dyn Dialect>,
}

impl<C: SqlClient> SqlDatabase<C> {
    pub fn new(client: C, dialect: Box<dyn Dialect>) -> Self {
        Self { client, dialect }
    }

    fn error(&self, operation: &str, err: anyhow::Error) -> LoadError {
        let transient = self.client.is_transient(&err);
        LoadError::database(operation, transient, err)
    }

    async fn run(&self, operation: &str, sql: &str, params: &[TypedValue]) -> Result<u64> {
        debug!("{operation}: {sql}");
        self.client
            .execute(sql, params)
            .await
            .map_err(|e| self.error(operation, e))
    }

    async fn run_all(&self, operation: &str, statements: &[String]) -> Result<()> {
        for sql in statements {
            self.run(operation, sql, &[]).await?;
        }
        Ok(())
    }

    async fn fetch(
        &self,
        operation: &str,
        statement: &Statement,
        column_types: &[UniversalType],
    ) -> Result<Vec<Vec<UniversalValue>>> {
        debug!("{operation}: {}", statement.sql);
        self.client
            .query(&statement.sql, &statement.params, column_types)
            .await
            .map_err(|e| self.error(operation, e))
    }

    async fn any_rows(&self, operation: &str, statement: &Statement) -> Result<bool> {
        let rows = self.fetch(operation, statement, &[UniversalType::Text]).await?;
        Ok(!rows.is_empty())
    }

    fn translation(&self, table: &TableRef, column: &str, err: load_core::TranslationError) -> LoadError {
        LoadError::Translation {
            table: table.to_string(),
            column: column.to_string(),
            source: err,
        }
    }

    /// Name the first column the dialect cannot express, if any.
    fn check_translatable(&self, table: &TableRef, definition: &TableDefinition) -> Result<()> {
        for column in definition.columns.iter().chain(&definition.discarded_columns) {
            self.dialect
                .translate_type(&column.column_type)
                .map_err(|e| self.translation(table, &column.name, e))?;
        }
        Ok(())
    }
}

fn to_row(columns: &[ColumnDefinition], values: Vec<UniversalValue>) -> Row {
    columns
        .iter()
        .zip(values)
        .fold(Row::new(), |row, (column, value)| row.with(column.name.clone(), value))
}

fn column_names(columns: &[ColumnDefinition]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

fn column_types(columns: &[ColumnDefinition]) -> Vec<UniversalType> {
    columns.iter().map(|c| c.column_type.clone()).collect()
}

#[async_trait]
impl<C: SqlClient> Database for SqlDatabase<C> {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn describe(&self) -> String {
        self.client.describe()
    }

    async fn ping(&self) -> Result<()> {
        self.fetch("ping", &Statement::new("SELECT 1"), &[UniversalType::Int64])
            .await
            .map(|_| ())
    }

    async fn database_exists(&self, database: &str) -> Result<bool> {
        self.any_rows("database exists", &self.dialect.database_exists(database))
            .await
    }

    async fn create_database(&self, database: &str) -> Result<()> {
        self.run_all("create database", &self.dialect.create_database(database))
            .await
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        self.run_all("drop database", &self.dialect.drop_database(database))
            .await
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        self.any_rows("table exists", &self.dialect.table_exists(table))
            .await
    }

    async fn describe_table(&self, table: &TableRef) -> Result<TableDefinition> {
        let rows = self
            .fetch(
                "describe table",
                &self.dialect.describe_columns(table),
                &DESCRIBE_COLUMN_TYPES,
            )
            .await?;
        if rows.is_empty() {
            return Err(LoadError::TableMissing(table.to_string()));
        }

        let keys: Vec<String> = self
            .fetch(
                "primary key columns",
                &self.dialect.primary_key_columns(table),
                &[UniversalType::Text],
            )
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| value.as_str().map(|s| s.trim().to_string()))
            .collect();

        let mut columns = Vec::with_capacity(rows.len());
        for values in rows {
            let row = values
                .into_iter()
                .enumerate()
                .fold(Row::new(), |row, (i, value)| row.with(format!("c{i}"), value));
            let native = NativeColumn::from_row(&row)
                .map_err(|e| LoadError::database("describe table", false, e))?;
            let mut column = ColumnDefinition::new(
                native.name.clone(),
                self.dialect.to_universal_type(&native),
            );
            column.nullable = native.nullable;
            column.identity = native.identity;
            column.collation = native.collation.clone();
            column.primary_key = keys.iter().any(|k| k.eq_ignore_ascii_case(&native.name));
            columns.push(column);
        }
        Ok(TableDefinition::new(table.table.clone(), columns))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        definition: &TableDefinition,
        enforce_primary_key: bool,
    ) -> Result<()> {
        self.check_translatable(table, definition)?;
        let sql = self
            .dialect
            .create_table(table, definition, enforce_primary_key)
            .map_err(|e| self.translation(table, "", e))?;
        self.run("create table", &sql, &[]).await.map(|_| ())
    }

    async fn add_column(&self, table: &TableRef, column: &ColumnDefinition) -> Result<()> {
        let sql = self
            .dialect
            .add_column(table, column)
            .map_err(|e| self.translation(table, &column.name, e))?;
        self.run("add column", &sql, &[]).await.map(|_| ())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        self.run("drop table", &self.dialect.drop_table(table), &[])
            .await
            .map(|_| ())
    }

    async fn count_rows(&self, table: &TableRef) -> Result<u64> {
        let rows = self
            .fetch("count rows", &self.dialect.count_rows(table), &[UniversalType::Int64])
            .await?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(UniversalValue::as_i64)
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn read_rows(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        order_by: &[String],
    ) -> Result<Vec<Row>> {
        let statement = self
            .dialect
            .select_rows(table, &column_names(columns), order_by);
        let rows = self
            .fetch("read rows", &statement, &column_types(columns))
            .await?;
        Ok(rows.into_iter().map(|values| to_row(columns, values)).collect())
    }

    async fn find_row(
        &self,
        table: &TableRef,
        columns: &[ColumnDefinition],
        key: &[Cell],
    ) -> Result<Option<Row>> {
        let statement = self.dialect.find_row(table, &column_names(columns), key);
        let rows = self
            .fetch("find row", &statement, &column_types(columns))
            .await?;
        Ok(rows.into_iter().next().map(|values| to_row(columns, values)))
    }

    async fn insert_row(&self, table: &TableRef, cells: &[Cell], identity_insert: bool) -> Result<u64> {
        let statement = self.dialect.insert_row(table, cells, identity_insert);
        self.run("insert row", &statement.sql, &statement.params).await
    }

    async fn update_row(&self, table: &TableRef, set: &[Cell], key: &[Cell]) -> Result<u64> {
        let statement = self.dialect.update_row(table, set, key);
        self.run("update row", &statement.sql, &statement.params).await
    }

    async fn create_archive_table(&self, archive: &TableRef, live: &TableDefinition) -> Result<()> {
        let sql = self
            .dialect
            .create_archive_table(archive, live)
            .map_err(|e| self.translation(archive, "", e))?;
        self.run("create archive table", &sql, &[]).await.map(|_| ())
    }

    async fn trigger_bodies(&self, live: &TableRef) -> Result<Vec<(String, String)>> {
        let rows = self
            .fetch(
                "read trigger",
                &self.dialect.trigger_bodies(live),
                &[UniversalType::Text, UniversalType::Text],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_iter().map(|v| match v {
                    UniversalValue::Null => String::new(),
                    other => other.to_string(),
                });
                let name = values.next().unwrap_or_default();
                let body = values.next().unwrap_or_default();
                (name, body)
            })
            .collect())
    }

    async fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Result<()> {
        self.run_all(
            "create archive trigger",
            &self.dialect.create_archive_trigger(trigger),
        )
        .await
    }

    async fn drop_archive_trigger(&self, live: &TableRef) -> Result<Vec<String>> {
        let mut messages = Vec::new();
        for sql in self.dialect.drop_archive_trigger(live) {
            self.run("drop archive trigger", &sql, &[]).await?;
            messages.push(format!("Ran: {sql}"));
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use load_core::UniversalType;
    use mysql_types::MySqlDialect;
    use std::sync::Mutex;

    /// Records statements and answers queries from a script.
    #[derive(Default)]
    struct ScriptedClient {
        executed: Mutex<Vec<(String, usize)>>,
        answers: Mutex<Vec<Vec<Vec<UniversalValue>>>>,
    }

    #[async_trait]
    impl SqlClient for ScriptedClient {
        async fn execute(&self, sql: &str, params: &[TypedValue]) -> anyhow::Result<u64> {
            self.executed.lock().unwrap().push((sql.to_string(), params.len()));
            Ok(1)
        }

        async fn query(
            &self,
            _sql: &str,
            _params: &[TypedValue],
            _column_types: &[UniversalType],
        ) -> anyhow::Result<Vec<Vec<UniversalValue>>> {
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                anyhow::bail!("Lock wait timeout exceeded");
            }
            Ok(answers.remove(0))
        }

        fn is_transient(&self, err: &anyhow::Error) -> bool {
            err.to_string().contains("Lock wait")
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn text(s: &str) -> UniversalValue {
        UniversalValue::Text(s.to_string())
    }

    fn describe_row(name: &str, data_type: &str, nullable: i64, identity: i64) -> Vec<UniversalValue> {
        vec![
            text(name),
            text(data_type),
            text(data_type),
            UniversalValue::Int(50),
            UniversalValue::Null,
            UniversalValue::Null,
            UniversalValue::Int(nullable),
            UniversalValue::Int(identity),
            UniversalValue::Null,
        ]
    }

    #[tokio::test]
    async fn test_describe_table_marks_keys() {
        let client = ScriptedClient::default();
        client.answers.lock().unwrap().extend([
            vec![
                describe_row("Id", "int", 0, 1),
                describe_row("Name", "varchar", 0, 0),
                describe_row("Postcode", "varchar", 1, 0),
            ],
            vec![vec![text("name")]],
        ]);
        let db = SqlDatabase::new(client, Box::new(MySqlDialect));
        let def = db
            .describe_table(&TableRef::new("Clinical", None, "People"))
            .await
            .unwrap();
        assert_eq!(def.primary_key_names(), vec!["Name".to_string()]);
        assert!(def.get_column("Id").unwrap().identity);
        assert!(def.get_column("Postcode").unwrap().nullable);
        assert_eq!(def.get_column_type("Name"), Some(&UniversalType::varchar(50)));
    }

    #[tokio::test]
    async fn test_missing_table_and_transient_errors() {
        let client = ScriptedClient::default();
        client.answers.lock().unwrap().push(vec![]);
        let db = SqlDatabase::new(client, Box::new(MySqlDialect));
        let table = TableRef::new("Clinical", None, "Nope");
        assert!(matches!(
            db.describe_table(&table).await,
            Err(LoadError::TableMissing(_))
        ));
        // The script is exhausted, so the next query fails with a lock timeout
        let err = db.count_rows(&table).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_untranslatable_column_is_named() {
        let db = SqlDatabase::new(ScriptedClient::default(), Box::new(MySqlDialect));
        let def = TableDefinition::new(
            "People",
            vec![
                ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
                ColumnDefinition::nullable("Shape", UniversalType::native("mssql", "geography")),
            ],
        );
        let err = db
            .create_table(&TableRef::new("Clinical_RAW", None, "People"), &def, false)
            .await
            .unwrap_err();
        match err {
            LoadError::Translation { column, .. } => assert_eq!(column, "Shape"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(db.client.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_binds_set_then_key() {
        let db = SqlDatabase::new(ScriptedClient::default(), Box::new(MySqlDialect));
        db.update_row(
            &TableRef::new("Clinical", None, "People"),
            &[Cell::new("Postcode", UniversalType::varchar(10), text("DD1 1PS"))],
            &[
                Cell::new("Name", UniversalType::varchar(50), text("Dave")),
                Cell::new("Age", UniversalType::Int32, UniversalValue::Int(18)),
            ],
        )
        .await
        .unwrap();
        let executed = db.client.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].0.starts_with("UPDATE `Clinical`.`People` SET `Postcode` = ?"));
        assert_eq!(executed[0].1, 3);
    }
}
