//! PostgreSQL schema column type conversion.
//!
//! Maps information_schema.columns rows (`data_type` plus `udt_name`) to
//! `UniversalType`.

use load_core::{NativeColumn, UniversalType};

/// Convert a PostgreSQL catalogue column to a `UniversalType`.
///
/// # Example
///
/// ```
/// use load_core::{NativeColumn, UniversalType};
/// use postgresql_types::postgresql_column_to_universal_type;
///
/// let column = NativeColumn {
///     name: "Price".to_string(),
///     data_type: "numeric".to_string(),
///     precision: Some(10),
///     scale: Some(2),
///     ..Default::default()
/// };
/// assert_eq!(
///     postgresql_column_to_universal_type(&column),
///     UniversalType::decimal(10, 2)
/// );
/// ```
pub fn postgresql_column_to_universal_type(column: &NativeColumn) -> UniversalType {
    let data_type = column.data_type.to_lowercase();
    if data_type == "array" || data_type == "user-defined" {
        let udt = column.column_type.clone().unwrap_or_default().to_lowercase();
        return match udt.strip_prefix('_') {
            Some(element) if data_type == "array" => {
                UniversalType::array(base_type(element, None, None, None).unwrap_or(UniversalType::Text))
            }
            _ => UniversalType::native("postgresql", udt),
        };
    }
    base_type(&data_type, column.length, column.precision, column.scale)
        .unwrap_or_else(|| UniversalType::native("postgresql", data_type))
}

fn base_type(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> Option<UniversalType> {
    let length = length.and_then(|l| u16::try_from(l).ok());
    let ut = match data_type {
        "smallint" | "int2" => UniversalType::Int16,
        "integer" | "int" | "int4" => UniversalType::Int32,
        "bigint" | "int8" => UniversalType::Int64,
        "real" | "float4" => UniversalType::Float32,
        "double precision" | "float8" => UniversalType::Float64,
        // Unconstrained numeric: widest exact type every engine can hold
        "numeric" | "decimal" => UniversalType::Decimal {
            precision: precision.map(|p| p.clamp(1, 38) as u8).unwrap_or(38),
            scale: scale.map(|s| s.clamp(0, 38) as u8).unwrap_or(10),
        },

        "boolean" | "bool" => UniversalType::Bool,

        "text" | "name" => UniversalType::Text,
        "varchar" | "character varying" => match length {
            Some(length) => UniversalType::VarChar { length },
            None => UniversalType::Text,
        },
        "bpchar" | "char" | "character" => UniversalType::Char {
            length: length.unwrap_or(1),
        },

        "bytea" => UniversalType::Bytes,

        "date" => UniversalType::Date,
        "time" | "time without time zone" => UniversalType::Time,
        "timestamp" | "timestamp without time zone" => UniversalType::LocalDateTime,
        "timestamptz" | "timestamp with time zone" => UniversalType::ZonedDateTime,

        "uuid" => UniversalType::Uuid,
        "json" | "jsonb" => UniversalType::Json,
        _ => return None,
    };
    Some(ut)
}
