//! PostgreSQL SQL dialect.
//!
//! The load's database name maps to a schema: `"Clinical_RAW"."People"`. Catalogue
//! lookups cast identifiers to `text` so parameters bind as plain strings.

use crate::schema::postgresql_column_to_universal_type;
use load_core::{
    archive_insert_columns, ArchiveTrigger, Dialect, Engine, NativeColumn, Statement, TableRef,
    TranslationError, TypedValue, UniversalType,
};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSqlDialect;

impl PostgreSqlDialect {
    fn trigger_name(table: &str) -> String {
        format!("{table}_onupdate")
    }

    fn function_name(table: &str) -> String {
        format!("{table}_archive")
    }

    fn schema_and_table(table: &TableRef) -> Vec<TypedValue> {
        vec![TypedValue::text(&table.database), TypedValue::text(&table.table)]
    }
}

impl Dialect for PostgreSqlDialect {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn collate_clause(&self, collation: &str) -> String {
        format!("COLLATE {}", self.quote_ident(collation))
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
            UniversalType::Bool => "BOOLEAN".to_string(),
            // No single-byte integer
            UniversalType::Int8 { .. } | UniversalType::Int16 => "SMALLINT".to_string(),
            UniversalType::Int32 => "INTEGER".to_string(),
            UniversalType::Int64 => "BIGINT".to_string(),
            UniversalType::Float32 => "REAL".to_string(),
            UniversalType::Float64 => "DOUBLE PRECISION".to_string(),
            UniversalType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
            UniversalType::Char { length } => format!("CHAR({length})"),
            UniversalType::VarChar { length } => format!("VARCHAR({length})"),
            UniversalType::Text | UniversalType::Enum { .. } | UniversalType::Set { .. } => {
                "TEXT".to_string()
            }
            UniversalType::Bytes => "BYTEA".to_string(),
            UniversalType::Date => "DATE".to_string(),
            UniversalType::Time => "TIME".to_string(),
            UniversalType::LocalDateTime => "TIMESTAMP".to_string(),
            UniversalType::ZonedDateTime => "TIMESTAMPTZ".to_string(),
            UniversalType::Uuid => "UUID".to_string(),
            UniversalType::Json => "JSONB".to_string(),
            UniversalType::Array { element_type } => match element_type.as_ref() {
                nested @ UniversalType::Array { .. } => {
                    return Err(TranslationError::unsupported(self.engine(), nested))
                }
                element => format!("{}[]", self.translate_type(element)?),
            },
            UniversalType::Native { dialect, type_name }
                if dialect == Engine::PostgreSql.as_str() =>
            {
                type_name.clone()
            }
            other @ UniversalType::Native { .. } => {
                return Err(TranslationError::unsupported(self.engine(), other))
            }
        };
        Ok(sql)
    }

    fn to_universal_type(&self, column: &NativeColumn) -> UniversalType {
        postgresql_column_to_universal_type(column)
    }

    fn database_exists(&self, database: &str) -> Statement {
        Statement::with_params(
            "SELECT schema_name::text FROM information_schema.schemata \
             WHERE schema_name::text = $1::text",
            vec![TypedValue::text(database)],
        )
    }

    fn create_database(&self, database: &str) -> Vec<String> {
        vec![format!("CREATE SCHEMA {}", self.quote_ident(database))]
    }

    fn drop_database(&self, database: &str) -> Vec<String> {
        vec![format!("DROP SCHEMA IF EXISTS {} CASCADE", self.quote_ident(database))]
    }

    fn table_exists(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema::text = $1::text AND table_name::text = $2::text",
            Self::schema_and_table(table),
        )
    }

    fn describe_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT column_name::text, data_type::text, udt_name::text, \
             character_maximum_length::bigint, numeric_precision::bigint, numeric_scale::bigint, \
             (CASE WHEN is_nullable = 'YES' THEN 1 ELSE 0 END)::bigint, \
             (CASE WHEN is_identity = 'YES' OR column_default LIKE 'nextval(%' THEN 1 ELSE 0 END)::bigint, \
             collation_name::text \
             FROM information_schema.columns \
             WHERE table_schema::text = $1::text AND table_name::text = $2::text \
             ORDER BY ordinal_position",
            Self::schema_and_table(table),
        )
    }

    fn primary_key_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT a.attname::text FROM pg_index i \
             JOIN pg_class c ON c.oid = i.indrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
             WHERE i.indisprimary AND n.nspname::text = $1::text AND c.relname::text = $2::text \
             ORDER BY array_position(i.indkey::int2[], a.attnum)",
            Self::schema_and_table(table),
        )
    }

    fn trigger_names(&self, live: &TableRef) -> Vec<String> {
        vec![Self::trigger_name(&live.table)]
    }

    fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Vec<String> {
        let live = &trigger.live;
        let function = self.qualify(&live.with_table(Self::function_name(&live.table)));
        let old_values: Vec<String> = trigger
            .columns
            .iter()
            .map(|c| format!("OLD.{}", self.quote_ident(c)))
            .collect();
        vec![
            format!(
                "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $body$\n\
                 BEGIN\n\
                 INSERT INTO {} ({})\n\
                 VALUES ({}, LOCALTIMESTAMP, current_user, CASE WHEN TG_OP = 'UPDATE' THEN 'U' ELSE 'D' END);\n\
                 IF TG_OP = 'DELETE' THEN RETURN OLD; END IF;\n\
                 RETURN NEW;\n\
                 END;\n\
                 $body$ LANGUAGE plpgsql",
                self.qualify(&trigger.archive),
                self.column_list(&archive_insert_columns(trigger)),
                old_values.join(", "),
            ),
            format!(
                "CREATE TRIGGER {} BEFORE UPDATE OR DELETE ON {} FOR EACH ROW EXECUTE FUNCTION {function}()",
                self.quote_ident(&Self::trigger_name(&live.table)),
                self.qualify(live),
            ),
        ]
    }

    fn drop_archive_trigger(&self, live: &TableRef) -> Vec<String> {
        vec![
            format!(
                "DROP TRIGGER IF EXISTS {} ON {}",
                self.quote_ident(&Self::trigger_name(&live.table)),
                self.qualify(live)
            ),
            format!(
                "DROP FUNCTION IF EXISTS {}()",
                self.qualify(&live.with_table(Self::function_name(&live.table)))
            ),
        ]
    }

    fn trigger_bodies(&self, live: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT t.tgname::text, p.prosrc::text FROM pg_trigger t \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_proc p ON p.oid = t.tgfoid \
             WHERE NOT t.tgisinternal AND n.nspname::text = $1::text AND c.relname::text = $2::text",
            Self::schema_and_table(live),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> TableRef {
        TableRef::new("Clinical", None, "People")
    }

    #[test]
    fn test_translate_types() {
        let d = PostgreSqlDialect;
        assert_eq!(d.translate_type(&UniversalType::Int8 { width: 4 }).unwrap(), "SMALLINT");
        assert_eq!(d.translate_type(&UniversalType::decimal(10, 2)).unwrap(), "NUMERIC(10,2)");
        assert_eq!(
            d.translate_type(&UniversalType::array(UniversalType::Text)).unwrap(),
            "TEXT[]"
        );
        assert!(d
            .translate_type(&UniversalType::array(UniversalType::array(UniversalType::Int32)))
            .is_err());
        assert!(d
            .translate_type(&UniversalType::native("mysql", "geometry"))
            .is_err());
    }

    #[test]
    fn test_collation_is_quoted() {
        let d = PostgreSqlDialect;
        let column = load_core::ColumnDefinition::new("Name", UniversalType::varchar(50))
            .key()
            .with_collation("C");
        assert_eq!(
            d.column_clause(&column).unwrap(),
            "\"Name\" VARCHAR(50) COLLATE \"C\" NOT NULL"
        );
    }

    #[test]
    fn test_placeholders_are_numbered() {
        let d = PostgreSqlDialect;
        assert_eq!(d.placeholder(3), "$3");
        assert_eq!(d.qualify(&live()), "\"Clinical\".\"People\"");
    }

    #[test]
    fn test_database_is_a_schema() {
        let d = PostgreSqlDialect;
        assert_eq!(d.create_database("Clinical_RAW"), vec!["CREATE SCHEMA \"Clinical_RAW\""]);
        assert_eq!(
            d.drop_database("Clinical_RAW"),
            vec!["DROP SCHEMA IF EXISTS \"Clinical_RAW\" CASCADE"]
        );
    }

    #[test]
    fn test_archive_trigger_function_and_trigger() {
        let d = PostgreSqlDialect;
        let trigger = ArchiveTrigger {
            live: live(),
            archive: live().with_table("People_Archive"),
            columns: vec!["Name".to_string(), "Postcode".to_string()],
        };
        let statements = d.create_archive_trigger(&trigger);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("\"Clinical\".\"People_archive\"()"));
        assert!(statements[0].contains("INSERT INTO \"Clinical\".\"People_Archive\""));
        assert!(statements[0].contains("OLD.\"Postcode\""));
        assert!(statements[1].contains("BEFORE UPDATE OR DELETE ON \"Clinical\".\"People\""));
        assert_eq!(d.drop_archive_trigger(&live()).len(), 2);
    }
}
