//! MySQL SQL dialect.
//!
//! Databases are MySQL schemas, qualified as `` `db`.`table` ``. The archive trigger is
//! a pair of `BEFORE UPDATE` / `BEFORE DELETE` triggers, because MySQL triggers
//! cannot fire on more than one event.

use crate::schema::mysql_column_to_universal_type;
use load_core::{
    archive_insert_columns, escape_literal, ArchiveTrigger, Dialect, Engine, NativeColumn,
    Statement, TableRef, TranslationError, TypedValue, UniversalType,
};

/// Largest VARCHAR that fits a utf8mb4 row.
const MAX_VARCHAR: u16 = 16383;

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    fn update_trigger_name(table: &str) -> String {
        format!("{table}_onupdate")
    }

    fn delete_trigger_name(table: &str) -> String {
        format!("{table}_ondelete")
    }

    fn trigger_statement(&self, trigger: &ArchiveTrigger, name: &str, event: &str, status: &str) -> String {
        let live = &trigger.live;
        let old_values: Vec<String> = trigger
            .columns
            .iter()
            .map(|c| format!("OLD.{}", self.quote_ident(c)))
            .collect();
        format!(
            "CREATE TRIGGER {} BEFORE {event} ON {} FOR EACH ROW\n\
             INSERT INTO {} ({}) VALUES ({}, NOW(), USER(), '{status}')",
            self.qualify(&live.with_table(name)),
            self.qualify(live),
            self.qualify(&trigger.archive),
            self.column_list(&archive_insert_columns(trigger)),
            old_values.join(", "),
        )
    }
}

impl Dialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn qualify(&self, table: &TableRef) -> String {
        format!(
            "{}.{}",
            self.quote_ident(&table.database),
            self.quote_ident(&table.table)
        )
    }

    fn translate_type(&self, column_type: &UniversalType) -> Result<String, TranslationError> {
        let sql = match column_type {
            UniversalType::Bool => "TINYINT(1)".to_string(),
            UniversalType::Int8 { width } => format!("TINYINT({})", (*width).max(2)),
            UniversalType::Int16 => "SMALLINT".to_string(),
            UniversalType::Int32 => "INT".to_string(),
            UniversalType::Int64 => "BIGINT".to_string(),
            UniversalType::Float32 => "FLOAT".to_string(),
            UniversalType::Float64 => "DOUBLE".to_string(),
            UniversalType::Decimal { precision, scale } => {
                format!("DECIMAL({},{scale})", (*precision).min(65))
            }
            UniversalType::Char { length } if *length <= 255 => format!("CHAR({length})"),
            UniversalType::Char { length } | UniversalType::VarChar { length }
                if *length <= MAX_VARCHAR =>
            {
                format!("VARCHAR({length})")
            }
            UniversalType::Char { .. } | UniversalType::VarChar { .. } | UniversalType::Text => {
                "LONGTEXT".to_string()
            }
            UniversalType::Bytes => "LONGBLOB".to_string(),
            UniversalType::Date => "DATE".to_string(),
            UniversalType::Time => "TIME(6)".to_string(),
            UniversalType::LocalDateTime | UniversalType::ZonedDateTime => "DATETIME(6)".to_string(),
            UniversalType::Uuid => "CHAR(36)".to_string(),
            UniversalType::Json | UniversalType::Array { .. } => "JSON".to_string(),
            UniversalType::Set { values } => format!("SET({})", quoted_values(values)),
            UniversalType::Enum { values } => format!("ENUM({})", quoted_values(values)),
            UniversalType::Native { dialect, type_name } if dialect == Engine::MySql.as_str() => {
                type_name.clone()
            }
            other @ UniversalType::Native { .. } => {
                return Err(TranslationError::unsupported(self.engine(), other))
            }
        };
        Ok(sql)
    }

    fn to_universal_type(&self, column: &NativeColumn) -> UniversalType {
        mysql_column_to_universal_type(column)
    }

    fn database_exists(&self, database: &str) -> Statement {
        Statement::with_params(
            "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?",
            vec![TypedValue::text(database)],
        )
    }

    fn create_database(&self, database: &str) -> Vec<String> {
        vec![format!("CREATE DATABASE {}", self.quote_ident(database))]
    }

    fn drop_database(&self, database: &str) -> Vec<String> {
        vec![format!("DROP DATABASE IF EXISTS {}", self.quote_ident(database))]
    }

    fn table_exists(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
            vec![TypedValue::text(&table.database), TypedValue::text(&table.table)],
        )
    }

    fn describe_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, CHARACTER_MAXIMUM_LENGTH, \
             NUMERIC_PRECISION, NUMERIC_SCALE, IF(IS_NULLABLE = 'YES', 1, 0), \
             IF(EXTRA LIKE '%auto_increment%', 1, 0), COLLATION_NAME \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
            vec![TypedValue::text(&table.database), TypedValue::text(&table.table)],
        )
    }

    fn primary_key_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY ORDINAL_POSITION",
            vec![TypedValue::text(&table.database), TypedValue::text(&table.table)],
        )
    }

    fn trigger_names(&self, live: &TableRef) -> Vec<String> {
        vec![
            Self::update_trigger_name(&live.table),
            Self::delete_trigger_name(&live.table),
        ]
    }

    fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Vec<String> {
        let table = &trigger.live.table;
        vec![
            self.trigger_statement(trigger, &Self::update_trigger_name(table), "UPDATE", "U"),
            self.trigger_statement(trigger, &Self::delete_trigger_name(table), "DELETE", "D"),
        ]
    }

    fn drop_archive_trigger(&self, live: &TableRef) -> Vec<String> {
        self.trigger_names(live)
            .iter()
            .map(|name| format!("DROP TRIGGER IF EXISTS {}", self.qualify(&live.with_table(name))))
            .collect()
    }

    fn trigger_bodies(&self, live: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT TRIGGER_NAME, ACTION_STATEMENT FROM INFORMATION_SCHEMA.TRIGGERS \
             WHERE EVENT_OBJECT_SCHEMA = ? AND EVENT_OBJECT_TABLE = ?",
            vec![TypedValue::text(&live.database), TypedValue::text(&live.table)],
        )
    }
}

fn quoted_values(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", escape_literal(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use load_core::{ColumnDefinition, TableDefinition};

    fn live() -> TableRef {
        TableRef::new("Clinical", None, "People")
    }

    #[test]
    fn test_translate_types() {
        let d = MySqlDialect;
        assert_eq!(d.translate_type(&UniversalType::Bool).unwrap(), "TINYINT(1)");
        assert_eq!(d.translate_type(&UniversalType::varchar(50)).unwrap(), "VARCHAR(50)");
        assert_eq!(d.translate_type(&UniversalType::char(300)).unwrap(), "VARCHAR(300)");
        assert_eq!(d.translate_type(&UniversalType::decimal(10, 2)).unwrap(), "DECIMAL(10,2)");
        assert_eq!(
            d.translate_type(&UniversalType::enumeration(vec!["it's".to_string()]))
                .unwrap(),
            "ENUM('it''s')"
        );
    }

    #[test]
    fn test_native_types_only_translate_into_their_own_engine() {
        let d = MySqlDialect;
        assert_eq!(
            d.translate_type(&UniversalType::native("mysql", "geometry")).unwrap(),
            "geometry"
        );
        assert!(d
            .translate_type(&UniversalType::native("mssql", "hierarchyid"))
            .is_err());
    }

    #[test]
    fn test_qualify_and_quote() {
        let d = MySqlDialect;
        assert_eq!(d.qualify(&live()), "`Clinical`.`People`");
        assert_eq!(d.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_create_table_relaxed_clone() {
        let d = MySqlDialect;
        let def = TableDefinition::new(
            "People",
            vec![
                ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
                ColumnDefinition::nullable("Postcode", UniversalType::varchar(10)),
            ],
        );
        let sql = d.create_table(&live().in_database("Clinical_RAW"), &def, false).unwrap();
        assert!(sql.starts_with("CREATE TABLE `Clinical_RAW`.`People`"));
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_archive_triggers_copy_old_values() {
        let d = MySqlDialect;
        let trigger = ArchiveTrigger {
            live: live(),
            archive: live().with_table("People_Archive"),
            columns: vec!["Name".to_string(), "Postcode".to_string()],
        };
        let statements = d.create_archive_trigger(&trigger);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("BEFORE UPDATE ON `Clinical`.`People`"));
        assert!(statements[0].contains("OLD.`Postcode`"));
        assert!(statements[0].contains("`Clinical`.`People_Archive`"));
        assert!(statements[0].ends_with("'U')"));
        assert!(statements[1].contains("BEFORE DELETE"));
        assert!(statements[1].ends_with("'D')"));

        let drops = d.drop_archive_trigger(&live());
        assert_eq!(drops[0], "DROP TRIGGER IF EXISTS `Clinical`.`People_onupdate`");
    }
}
