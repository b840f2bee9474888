//! Oracle SQL dialect.
//!
//! Identifiers are quoted and upper-cased so that names created here resolve the
//! same way as unquoted names typed by an operator.

use crate::schema::oracle_column_to_universal_type;
use load_core::{
    archive_insert_columns, ArchiveTrigger, Dialect, Engine, NativeColumn, Statement, TableRef,
    TranslationError, TypedValue, UniversalType,
};

const MAX_CHAR: u16 = 2000;
const MAX_VARCHAR2: u16 = 4000;

/// Oracle dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl OracleDialect {
    fn trigger_name(table: &str) -> String {
        format!("{}_ONUPDATE", table.to_uppercase())
    }

    fn owner_and_table(table: &TableRef) -> Vec<TypedValue> {
        vec![
            TypedValue::text(table.database.to_uppercase()),
            TypedValue::text(table.table.to_uppercase()),
        ]
    }
}

impl Dialect for OracleDialect {
    fn engine(&self) -> Engine {
        Engine::Oracle
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.to_uppercase().replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{index}")
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
            UniversalType::Bool => "NUMBER(1)".to_string(),
            UniversalType::Int8 { .. } => "NUMBER(3)".to_string(),
            UniversalType::Int16 => "NUMBER(5)".to_string(),
            UniversalType::Int32 => "NUMBER(10)".to_string(),
            UniversalType::Int64 => "NUMBER(19)".to_string(),
            UniversalType::Float32 => "BINARY_FLOAT".to_string(),
            UniversalType::Float64 => "BINARY_DOUBLE".to_string(),
            UniversalType::Decimal { precision, scale } => {
                format!("NUMBER({},{scale})", (*precision).min(38))
            }
            UniversalType::Char { length } if *length <= MAX_CHAR => format!("CHAR({length})"),
            UniversalType::VarChar { length } if *length <= MAX_VARCHAR2 => {
                format!("VARCHAR2({length})")
            }
            UniversalType::Char { .. } | UniversalType::VarChar { .. } | UniversalType::Text => {
                "CLOB".to_string()
            }
            UniversalType::Bytes => "BLOB".to_string(),
            UniversalType::Date => "DATE".to_string(),
            UniversalType::LocalDateTime => "TIMESTAMP".to_string(),
            UniversalType::ZonedDateTime => "TIMESTAMP WITH TIME ZONE".to_string(),
            UniversalType::Uuid => "VARCHAR2(36)".to_string(),
            UniversalType::Json => "CLOB".to_string(),
            UniversalType::Set { .. } | UniversalType::Enum { .. } => {
                format!("VARCHAR2({MAX_VARCHAR2})")
            }
            UniversalType::Native { dialect, type_name } if dialect == Engine::Oracle.as_str() => {
                type_name.clone()
            }
            other @ (UniversalType::Time | UniversalType::Array { .. } | UniversalType::Native { .. }) => {
                return Err(TranslationError::unsupported(self.engine(), other))
            }
        };
        Ok(sql)
    }

    fn to_universal_type(&self, column: &NativeColumn) -> UniversalType {
        oracle_column_to_universal_type(column)
    }

    fn database_exists(&self, database: &str) -> Statement {
        Statement::with_params(
            "SELECT USERNAME FROM ALL_USERS WHERE USERNAME = :1",
            vec![TypedValue::text(database.to_uppercase())],
        )
    }

    fn create_database(&self, database: &str) -> Vec<String> {
        let user = self.quote_ident(database);
        vec![
            format!("CREATE USER {user} NO AUTHENTICATION"),
            format!("ALTER USER {user} QUOTA UNLIMITED ON USERS"),
        ]
    }

    fn drop_database(&self, database: &str) -> Vec<String> {
        vec![format!("DROP USER {} CASCADE", self.quote_ident(database))]
    }

    fn table_exists(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT TABLE_NAME FROM ALL_TABLES WHERE OWNER = :1 AND TABLE_NAME = :2",
            Self::owner_and_table(table),
        )
    }

    fn describe_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT COLUMN_NAME, DATA_TYPE, NULL, CHAR_LENGTH, DATA_PRECISION, DATA_SCALE, \
             CASE WHEN NULLABLE = 'Y' THEN 1 ELSE 0 END, \
             CASE WHEN IDENTITY_COLUMN = 'YES' THEN 1 ELSE 0 END, COLLATION \
             FROM ALL_TAB_COLUMNS WHERE OWNER = :1 AND TABLE_NAME = :2 \
             ORDER BY COLUMN_ID",
            Self::owner_and_table(table),
        )
    }

    fn primary_key_columns(&self, table: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT cc.COLUMN_NAME FROM ALL_CONSTRAINTS c \
             JOIN ALL_CONS_COLUMNS cc \
               ON cc.OWNER = c.OWNER AND cc.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
             WHERE c.OWNER = :1 AND c.TABLE_NAME = :2 AND c.CONSTRAINT_TYPE = 'P' \
             ORDER BY cc.POSITION",
            Self::owner_and_table(table),
        )
    }

    fn trigger_names(&self, live: &TableRef) -> Vec<String> {
        vec![Self::trigger_name(&live.table)]
    }

    fn create_archive_trigger(&self, trigger: &ArchiveTrigger) -> Vec<String> {
        let live = &trigger.live;
        let old_values: Vec<String> = trigger
            .columns
            .iter()
            .map(|c| format!(":OLD.{}", self.quote_ident(c)))
            .collect();
        vec![format!(
            "CREATE OR REPLACE TRIGGER {} BEFORE UPDATE OR DELETE ON {} FOR EACH ROW\n\
             BEGIN\n  INSERT INTO {} ({}) VALUES ({}, SYSDATE, USER, \
             CASE WHEN UPDATING THEN 'U' ELSE 'D' END);\nEND;",
            self.qualify(&live.with_table(Self::trigger_name(&live.table))),
            self.qualify(live),
            self.qualify(&trigger.archive),
            self.column_list(&archive_insert_columns(trigger)),
            old_values.join(", "),
        )]
    }

    fn drop_archive_trigger(&self, live: &TableRef) -> Vec<String> {
        vec![format!(
            "DROP TRIGGER {}",
            self.qualify(&live.with_table(Self::trigger_name(&live.table)))
        )]
    }

    fn trigger_bodies(&self, live: &TableRef) -> Statement {
        Statement::with_params(
            "SELECT TRIGGER_NAME, TRIGGER_BODY FROM ALL_TRIGGERS \
             WHERE TABLE_OWNER = :1 AND TABLE_NAME = :2",
            Self::owner_and_table(live),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use load_core::{Cell, UniversalValue};

    fn live() -> TableRef {
        TableRef::new("Clinical", None, "People")
    }

    #[test]
    fn test_translate_types() {
        let d = OracleDialect;
        assert_eq!(d.translate_type(&UniversalType::Bool).unwrap(), "NUMBER(1)");
        assert_eq!(d.translate_type(&UniversalType::varchar(50)).unwrap(), "VARCHAR2(50)");
        assert_eq!(d.translate_type(&UniversalType::varchar(5000)).unwrap(), "CLOB");
        assert_eq!(d.translate_type(&UniversalType::decimal(10, 2)).unwrap(), "NUMBER(10,2)");
        assert!(d.translate_type(&UniversalType::Time).is_err());
        assert!(d
            .translate_type(&UniversalType::native("mysql", "geometry"))
            .is_err());
    }

    #[test]
    fn test_update_placeholders_are_numbered() {
        let d = OracleDialect;
        let stmt = d.update_row(
            &live(),
            &[Cell::new("Postcode", UniversalType::varchar(10), UniversalValue::Text("DD3".into()))],
            &[Cell::new("Name", UniversalType::varchar(50), UniversalValue::Text("Dave".into()))],
        );
        assert_eq!(
            stmt.sql,
            "UPDATE \"CLINICAL\".\"PEOPLE\" SET \"POSTCODE\" = :1 WHERE \"NAME\" = :2"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_databases_are_users() {
        let d = OracleDialect;
        assert_eq!(
            d.create_database("Clinical_RAW")[0],
            "CREATE USER \"CLINICAL_RAW\" NO AUTHENTICATION"
        );
        assert_eq!(d.drop_database("Clinical_RAW"), vec!["DROP USER \"CLINICAL_RAW\" CASCADE"]);
        let stmt = d.database_exists("Clinical_RAW");
        assert_eq!(stmt.params, vec![TypedValue::text("CLINICAL_RAW")]);
    }

    #[test]
    fn test_archive_trigger() {
        let d = OracleDialect;
        let trigger = ArchiveTrigger {
            live: live(),
            archive: live().with_table("People_Archive"),
            columns: vec!["Name".to_string(), "Postcode".to_string()],
        };
        let sql = &d.create_archive_trigger(&trigger)[0];
        assert!(sql.contains("\"CLINICAL\".\"PEOPLE_ONUPDATE\""));
        assert!(sql.contains("BEFORE UPDATE OR DELETE ON \"CLINICAL\".\"PEOPLE\""));
        assert!(sql.contains(":OLD.\"POSTCODE\""));
        assert!(sql.contains("\"VALIDTO\", \"USERID\", \"STATUS\""));
        assert_eq!(d.trigger_names(&live()), vec!["PEOPLE_ONUPDATE"]);
    }
}
