//! SQL Server SQL dialect.
//!
//! Tables are qualified as `[db].[schema].[table]` with `dbo` as the default schema.
//! CREATE TRIGGER cannot name a database and must start its batch, so trigger DDL is
//! wrapped in `EXEC [db].sys.sp_executesql N'...'`.

use crate::schema::mssql_column_to_universal_type;
use load_core::{
    archive_insert_columns, escape_literal, ArchiveTrigger, Cell, Dialect, Engine, NativeColumn,
    Statement, TableRef, TranslationError, TypedValue, UniversalType,
};

const DEFAULT_SCHEMA: &str = "dbo";

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    fn trigger_name(table: &str) -> String {
        format!("{table}_OnUpdate")
    }

    fn schema<'a>(&self, table: &'a TableRef) -> &'a str {
        table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// `[schema].[object]`, valid inside the table's own database.
    fn local_name(&self, table: &TableRef, object: &str) -> String {
        format!("{}.{}", self.quote_ident(self.schema(table)), self.quote_ident(object))
    }

    /// Run `sql` inside `database`.
    fn in_database(&self, database: &str, sql: &str) -> String {
        format!(
            "EXEC {}.sys.sp_executesql N'{}'",
            self.quote_ident(database),
            escape_literal(sql)
        )
    }

    /// The qualified table name as a parameter, for `OBJECT_ID(@P1)`.
    fn object_param(&self, table: &TableRef) -> Vec<TypedValue> {
        vec![TypedValue::text(self.qualify(table))]
    }
}

impl Dialect for MssqlDialect {
    fn engine(&self) -> Engine {
        Engine::MicrosoftSqlServer
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{index}")
    }

    fn qualify(&self, table: &TableRef) -> String {
        format!(
            "{}.{}",
            self.quote_ident(&table.database),
            self.local_name(table, &table.table)
        )
    }

    fn translate_type(&self, column_type: &UniversalType) -> Result<String, TranslationError> {
        let sql = match column_type {
            UniversalType::Bool => "BIT".to_string(),
            // tinyint is unsigned
            UniversalType::Int8 { .. } | UniversalType::Int16 => "SMALLINT".to_string(),
            UniversalType::Int32 => "INT".to_string(),
            UniversalType::Int64 => "BIGINT".to_string(),
            UniversalType::Float32 => "REAL".to_string(),
            UniversalType::Float64 => "FLOAT".to_string(),
            UniversalType::Decimal { precision, scale } => {
                format!("DECIMAL({},{scale})", (*precision).min(38))
            }
            UniversalType::Char { length } if *length <= 8000 => format!("CHAR({length})"),
            UniversalType::VarChar { length } if *length <= 8000 => format!("VARCHAR({length})"),
            UniversalType::Char { .. }
            | UniversalType::VarChar { .. }
            | UniversalType::Text
            | UniversalType::Set { .. } => "VARCHAR(MAX)".to_string(),
            UniversalType::Enum { values } => {
                let longest = values.iter().map(|v| v.chars().count()).max().unwrap_or(1);
                format!("VARCHAR({})", longest.clamp(1, 8000))
            }
            UniversalType::Bytes => "VARBINARY(MAX)".to_string(),
            UniversalType::Date => "DATE".to_string(),
            UniversalType::Time => "TIME".to_string(),
            UniversalType::LocalDateTime => "DATETIME2".to_string(),
            UniversalType::ZonedDateTime => "DATETIMEOFFSET".to_string(),
            UniversalType::Uuid => "UNIQUEIDENTIFIER".to_string(),
            UniversalType::Json => "NVARCHAR(MAX)".to_string(),
            UniversalType::Native { dialect, type_name }
                if dialect == Engine::MicrosoftSqlServer.as_str() =>
            {
                type_name.clone()
            }
            other @ (UniversalType::Array { .. } | UniversalType::Native { .. }) => {
                return Err(TranslationError::unsupported(self.engine(), other))
            }
        };
        Ok(sql)
    }

    fn to_universal_type(&self, column: &NativeColumn) -> UniversalType {
        mssql_column_to_universal_type(column)
    }

    fn database_exists(&self, database: &str) -> Statement {
        Statement::with_params(
            "SELECT name FROM sys.databases WHERE name = @P1",
            vec![TypedValue::text(database)],
        )
    }

    fn create_database(&self, database: &str) -> Vec<String> {
        vec![format!("CREATE DATABASE {}", self.quote_ident(database))]
    }

    fn drop_database(&self, database: &str) -> Vec<String> {
        let quoted = self.quote_ident(database);
        vec![format!(
            "IF DB_ID(N'{}') IS NOT NULL BEGIN \
             ALTER DATABASE {quoted} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
             DROP DATABASE {quoted}; END",
            escape_literal(database)
        )]
    }

    fn table_exists(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT 1 WHERE OBJECT_ID(@P1, N'U') IS NOT NULL",
            self.object_param(table),
        )
    }

    fn describe_columns(&self, table: &TableRef) -> Statement {
        let db = self.quote_ident(&table.database);
        Statement::with_params(
            format!(
                "SELECT c.name, t.name, TYPE_NAME(c.system_type_id), \
                 CAST(CASE WHEN t.name IN ('nchar', 'nvarchar') AND c.max_length > 0 \
                      THEN c.max_length / 2 ELSE c.max_length END AS bigint), \
                 CAST(c.precision AS bigint), CAST(c.scale AS bigint), \
                 CAST(c.is_nullable AS bigint), CAST(c.is_identity AS bigint), c.collation_name \
                 FROM {db}.sys.columns c \
                 JOIN {db}.sys.types t ON t.user_type_id = c.user_type_id \
                 WHERE c.object_id = OBJECT_ID(@P1) \
                 ORDER BY c.column_id"
            ),
            self.object_param(table),
        )
    }

    fn primary_key_columns(&self, table: &TableRef) -> Statement {
        let db = self.quote_ident(&table.database);
        Statement::with_params(
            format!(
                "SELECT c.name FROM {db}.sys.indexes i \
                 JOIN {db}.sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
                 JOIN {db}.sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
                 WHERE i.is_primary_key = 1 AND i.object_id = OBJECT_ID(@P1) \
                 ORDER BY ic.key_ordinal"
            ),
            self.object_param(table),
        )
    }

    fn count_rows(&self, table: &TableRef) -> Statement {
        Statement::new(format!("SELECT COUNT_BIG(*) FROM {}", self.qualify(table)))
    }

    fn insert_row(&self, table: &TableRef, cells: &[Cell], identity_insert: bool) -> Statement {
        let names: Vec<String> = cells.iter().map(|c| c.column.clone()).collect();
        let placeholders: Vec<String> = (1..=cells.len()).map(|i| self.placeholder(i)).collect();
        let qualified = self.qualify(table);
        let insert = format!(
            "INSERT INTO {qualified} ({}) VALUES ({})",
            self.column_list(&names),
            placeholders.join(", ")
        );
        let sql = if identity_insert {
            format!(
                "SET IDENTITY_INSERT {qualified} ON; {insert}; SET IDENTITY_INSERT {qualified} OFF"
            )
        } else {
            insert
        };
        Statement::with_params(sql, cells.iter().map(|c| c.value.clone()).collect())
    }

    fn trigger_names(&self, live: &TableRef) -> Vec<String> {
        vec![Self::trigger_name(&live.table)]
    }

    fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Vec<String> {
        let live = &trigger.live;
        let columns = self.column_list(&trigger.columns);
        let body = format!(
            "CREATE TRIGGER {} ON {}\n\
             AFTER UPDATE, DELETE\n\
             AS\n\
             BEGIN\n\
             SET NOCOUNT ON\n\
             DECLARE @status char(1) = CASE WHEN EXISTS (SELECT * FROM inserted) THEN 'U' ELSE 'D' END\n\
             INSERT INTO {} ({})\n\
             SELECT {columns}, GETDATE(), SYSTEM_USER, @status FROM deleted\n\
             END",
            self.local_name(live, &Self::trigger_name(&live.table)),
            self.local_name(live, &live.table),
            self.local_name(&trigger.archive, &trigger.archive.table),
            self.column_list(&archive_insert_columns(trigger)),
        );
        vec![self.in_database(&live.database, &body)]
    }

    fn drop_archive_trigger(&self, live: &TableRef) -> Vec<String> {
        let drop = format!(
            "DROP TRIGGER IF EXISTS {}",
            self.local_name(live, &Self::trigger_name(&live.table))
        );
        vec![self.in_database(&live.database, &drop)]
    }

    fn trigger_bodies(&self, live: &TableRef) -> Statement {
        let db = self.quote_ident(&live.database);
        Statement::with_params(
            format!(
                "SELECT tr.name, m.definition FROM {db}.sys.triggers tr \
                 JOIN {db}.sys.sql_modules m ON m.object_id = tr.object_id \
                 WHERE tr.parent_id = OBJECT_ID(@P1)"
            ),
            self.object_param(live),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use load_core::{ColumnDefinition, TableDefinition, UniversalValue};

    fn live() -> TableRef {
        TableRef::new("Clinical", None, "People")
    }

    #[test]
    fn test_qualify_defaults_to_dbo() {
        let d = MssqlDialect;
        assert_eq!(d.qualify(&live()), "[Clinical].[dbo].[People]");
        let custom = TableRef::new("Clinical", Some("load".to_string()), "People");
        assert_eq!(d.qualify(&custom), "[Clinical].[load].[People]");
        assert_eq!(d.quote_ident("a]b"), "[a]]b]");
    }

    #[test]
    fn test_translate_types() {
        let d = MssqlDialect;
        assert_eq!(d.translate_type(&UniversalType::varchar(50)).unwrap(), "VARCHAR(50)");
        assert_eq!(d.translate_type(&UniversalType::varchar(9000)).unwrap(), "VARCHAR(MAX)");
        assert_eq!(d.translate_type(&UniversalType::Bool).unwrap(), "BIT");
        assert_eq!(
            d.translate_type(&UniversalType::enumeration(vec!["small".to_string(), "medium".to_string()]))
                .unwrap(),
            "VARCHAR(6)"
        );
        assert!(matches!(
            d.translate_type(&UniversalType::array(UniversalType::Int32)),
            Err(TranslationError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_staging_table_keeps_key_collation() {
        let d = MssqlDialect;
        let definition = TableDefinition::new(
            "People",
            vec![
                ColumnDefinition::new("Name", UniversalType::varchar(50))
                    .key()
                    .with_collation("Latin1_General_CS_AS"),
                ColumnDefinition::nullable("Age", UniversalType::Int32),
            ],
        );
        let staging = TableRef::new("Clinical_STAGING", Some("dbo".to_string()), "People");
        let sql = d.create_table(&staging, &definition, true).unwrap();
        assert!(
            sql.contains("[Name] VARCHAR(50) COLLATE Latin1_General_CS_AS NOT NULL"),
            "{sql}"
        );
        assert!(sql.contains("[Age] INT NULL"), "{sql}");
        assert!(sql.contains("PRIMARY KEY ([Name])"), "{sql}");
    }

    #[test]
    fn test_count_uses_count_big() {
        let d = MssqlDialect;
        assert_eq!(
            d.count_rows(&live()).sql,
            "SELECT COUNT_BIG(*) FROM [Clinical].[dbo].[People]"
        );
    }

    #[test]
    fn test_identity_insert_wraps_statement() {
        let d = MssqlDialect;
        let cells = vec![Cell::new("Id", UniversalType::Int32, UniversalValue::Int(7))];
        let plain = d.insert_row(&live(), &cells, false);
        assert_eq!(plain.sql, "INSERT INTO [Clinical].[dbo].[People] ([Id]) VALUES (@P1)");
        let identity = d.insert_row(&live(), &cells, true);
        assert!(identity.sql.starts_with("SET IDENTITY_INSERT [Clinical].[dbo].[People] ON;"));
        assert!(identity.sql.ends_with("OFF"));
    }

    #[test]
    fn test_trigger_runs_inside_database() {
        let d = MssqlDialect;
        let trigger = ArchiveTrigger {
            live: live(),
            archive: live().with_table("People_Archive"),
            columns: vec!["Name".to_string(), "Postcode".to_string()],
        };
        let statements = d.create_archive_trigger(&trigger);
        assert_eq!(statements.len(), 1);
        let sql = &statements[0];
        assert!(sql.starts_with("EXEC [Clinical].sys.sp_executesql N'CREATE TRIGGER [dbo].[People_OnUpdate]"));
        assert!(sql.contains("AFTER UPDATE, DELETE"));
        assert!(sql.contains("THEN ''U'' ELSE ''D''"));
        assert!(sql.contains("INSERT INTO [dbo].[People_Archive] ([Name], [Postcode], [ValidTo], [UserID], [Status])"));
        assert!(sql.contains("FROM deleted"));
    }

    #[test]
    fn test_drop_database_is_guarded() {
        let d = MssqlDialect;
        let sql = &d.drop_database("Clinical_RAW")[0];
        assert!(sql.starts_with("IF DB_ID(N'Clinical_RAW') IS NOT NULL"));
        assert!(sql.contains("SET SINGLE_USER WITH ROLLBACK IMMEDIATE"));
    }
}
