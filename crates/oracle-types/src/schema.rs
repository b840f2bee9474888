//! Oracle `ALL_TAB_COLUMNS` type conversion.

use load_core::{NativeColumn, UniversalType};

/// Convert an Oracle catalogue column to a `UniversalType`.
///
/// `NUMBER` without precision is unconstrained, so it becomes the widest decimal
/// rather than an integer. `DATE` carries a time of day in Oracle.
pub fn oracle_column_to_universal_type(column: &NativeColumn) -> UniversalType {
    let data_type = column.data_type.to_uppercase();
    let length = column.length.and_then(|l| u16::try_from(l).ok()).filter(|l| *l > 0);

    if data_type.starts_with("TIMESTAMP") {
        return if data_type.contains("TIME ZONE") {
            UniversalType::ZonedDateTime
        } else {
            UniversalType::LocalDateTime
        };
    }

    match data_type.as_str() {
        "NUMBER" => match (column.precision, column.scale.unwrap_or(0)) {
            (Some(1), 0) => UniversalType::Bool,
            (Some(p), 0) if p <= 5 => UniversalType::Int16,
            (Some(p), 0) if p <= 10 => UniversalType::Int32,
            (Some(p), 0) if p <= 19 => UniversalType::Int64,
            (Some(p), s) => UniversalType::decimal(p.clamp(1, 38) as u8, s.clamp(0, 38) as u8),
            (None, _) => UniversalType::decimal(38, 10),
        },
        "FLOAT" | "BINARY_DOUBLE" => UniversalType::Float64,
        "BINARY_FLOAT" => UniversalType::Float32,
        "CHAR" | "NCHAR" => match length {
            Some(length) => UniversalType::Char { length },
            None => UniversalType::Text,
        },
        "VARCHAR2" | "NVARCHAR2" | "VARCHAR" => match length {
            Some(length) => UniversalType::VarChar { length },
            None => UniversalType::Text,
        },
        "CLOB" | "NCLOB" | "LONG" => UniversalType::Text,
        "BLOB" | "RAW" | "LONG RAW" => UniversalType::Bytes,
        "DATE" => UniversalType::LocalDateTime,
        "JSON" => UniversalType::Json,
        _ => UniversalType::native("oracle", data_type),
    }
}
