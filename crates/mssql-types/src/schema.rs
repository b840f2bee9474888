//! SQL Server schema column type conversion.
//!
//! Maps `sys.columns` joined with `sys.types` to `UniversalType`. Lengths for
//! `nchar`/`nvarchar` arrive already converted from bytes to characters; `-1` means
//! `(MAX)`.

use load_core::{NativeColumn, UniversalType};

/// Convert a SQL Server catalogue column to a `UniversalType`.
///
/// # Example
///
/// ```
/// use load_core::{NativeColumn, UniversalType};
/// use mssql_types::mssql_column_to_universal_type;
///
/// let column = NativeColumn {
///     name: "Postcode".to_string(),
///     data_type: "varchar".to_string(),
///     length: Some(10),
///     ..Default::default()
/// };
/// assert_eq!(mssql_column_to_universal_type(&column), UniversalType::varchar(10));
/// ```
pub fn mssql_column_to_universal_type(column: &NativeColumn) -> UniversalType {
    let data_type = column.data_type.to_lowercase();
    // -1 is (MAX), which does not fit u16 and falls through to Text
    let length = column.length.and_then(|l| u16::try_from(l).ok()).filter(|l| *l > 0);

    match data_type.as_str() {
        "bit" => UniversalType::Bool,
        // tinyint is unsigned 0..255, which needs 16 bits signed
        "tinyint" | "smallint" => UniversalType::Int16,
        "int" => UniversalType::Int32,
        "bigint" => UniversalType::Int64,
        "real" => UniversalType::Float32,
        "float" => match column.precision {
            Some(p) if p <= 24 => UniversalType::Float32,
            _ => UniversalType::Float64,
        },
        "decimal" | "numeric" => UniversalType::Decimal {
            precision: column.precision.map(|p| p.clamp(1, 38) as u8).unwrap_or(18),
            scale: column.scale.map(|s| s.clamp(0, 38) as u8).unwrap_or(0),
        },
        "money" => UniversalType::decimal(19, 4),
        "smallmoney" => UniversalType::decimal(10, 4),

        "char" | "nchar" => match length {
            Some(length) => UniversalType::Char { length },
            None => UniversalType::Text,
        },
        "varchar" | "nvarchar" => match length {
            Some(length) => UniversalType::VarChar { length },
            None => UniversalType::Text,
        },
        "text" | "ntext" | "sysname" => UniversalType::Text,

        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => UniversalType::Bytes,

        "date" => UniversalType::Date,
        "time" => UniversalType::Time,
        "datetime" | "datetime2" | "smalldatetime" => UniversalType::LocalDateTime,
        "datetimeoffset" => UniversalType::ZonedDateTime,

        "uniqueidentifier" => UniversalType::Uuid,

        _ => UniversalType::native("mssql", data_type),
    }
}
