//! MySQL schema column type conversion.
//!
//! Maps INFORMATION_SCHEMA.COLUMNS rows to `UniversalType` when a LIVE table is
//! discovered on MySQL.

use load_core::{NativeColumn, UniversalType};

/// Convert a MySQL catalogue column to a `UniversalType`.
///
/// `data_type` is the base type (`int`, `varchar`); `column_type` carries the full
/// text (`tinyint(1)`, `enum('a','b')`) which decides booleans, enums and sets.
/// Types with no abstract equivalent become `UniversalType::Native`.
///
/// # Example
///
/// ```
/// use load_core::{NativeColumn, UniversalType};
/// use mysql_types::mysql_column_to_universal_type;
///
/// let column = NativeColumn {
///     name: "Active".to_string(),
///     data_type: "tinyint".to_string(),
///     column_type: Some("tinyint(1)".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(mysql_column_to_universal_type(&column), UniversalType::Bool);
/// ```
pub fn mysql_column_to_universal_type(column: &NativeColumn) -> UniversalType {
    let column_type = column
        .column_type
        .clone()
        .unwrap_or_else(|| column.data_type.clone())
        .to_lowercase();
    let length = column
        .length
        .and_then(|l| u16::try_from(l).ok())
        .or_else(|| extract_length_from_column_type(&column_type));

    match column.data_type.to_lowercase().as_str() {
        "tinyint" => {
            if column_type.starts_with("tinyint(1)") {
                UniversalType::Bool
            } else {
                let width = extract_length_from_column_type(&column_type)
                    .map(|l| l as u8)
                    .unwrap_or(4);
                UniversalType::Int8 { width }
            }
        }
        "bit" if column_type == "bit(1)" || column_type == "bit" => UniversalType::Bool,
        "boolean" | "bool" => UniversalType::Bool,
        "smallint" => UniversalType::Int16,
        "mediumint" | "int" | "integer" => UniversalType::Int32,
        "bigint" => UniversalType::Int64,
        "float" => UniversalType::Float32,
        "double" | "real" => UniversalType::Float64,
        "decimal" | "numeric" => UniversalType::Decimal {
            precision: column.precision.map(|p| p.clamp(1, 38) as u8).unwrap_or(10),
            scale: column.scale.map(|s| s.clamp(0, 38) as u8).unwrap_or(0),
        },

        "varchar" => match length {
            Some(length) => UniversalType::VarChar { length },
            None => UniversalType::Text,
        },
        "char" => UniversalType::Char {
            length: length.unwrap_or(1),
        },
        "text" | "tinytext" | "mediumtext" | "longtext" => UniversalType::Text,

        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            UniversalType::Bytes
        }

        "date" => UniversalType::Date,
        "time" => UniversalType::Time,
        "timestamp" | "datetime" => UniversalType::LocalDateTime,

        "json" => UniversalType::Json,

        "set" => UniversalType::Set {
            values: extract_set_or_enum_values(&column_type),
        },
        "enum" => UniversalType::Enum {
            values: extract_set_or_enum_values(&column_type),
        },

        _ => UniversalType::native("mysql", column_type),
    }
}

/// Extract the first length argument of a column type string.
///
/// E.g., "varchar(255)" -> Some(255), "decimal(10,2)" -> Some(10)
fn extract_length_from_column_type(column_type: &str) -> Option<u16> {
    let start = column_type.find('(')?;
    let end = column_type.find(')')?;
    if start >= end {
        return None;
    }
    let inner = &column_type[start + 1..end];
    inner.split(',').next()?.trim().parse().ok()
}

/// Extract the allowed values of a SET or ENUM column type string.
///
/// E.g., "enum('small','medium','large')" -> ["small", "medium", "large"]
fn extract_set_or_enum_values(column_type: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (column_type.find('('), column_type.rfind(')')) else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }
    column_type[start + 1..end]
        .split(',')
        .map(|part| part.trim().trim_matches('\'').trim_matches('"').replace("''", "'"))
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str, column_type: &str) -> NativeColumn {
        NativeColumn {
            name: "c".to_string(),
            data_type: data_type.to_string(),
            column_type: Some(column_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_mysql_int_types() {
        assert_eq!(
            mysql_column_to_universal_type(&column("tinyint", "tinyint(4)")),
            UniversalType::Int8 { width: 4 }
        );
        assert_eq!(
            mysql_column_to_universal_type(&column("int", "int(11)")),
            UniversalType::Int32
        );
        assert_eq!(
            mysql_column_to_universal_type(&column("bigint", "bigint unsigned")),
            UniversalType::Int64
        );
    }

    #[test]
    fn test_mysql_tinyint1_bool() {
        assert_eq!(
            mysql_column_to_universal_type(&column("tinyint", "tinyint(1)")),
            UniversalType::Bool
        );
    }

    #[test]
    fn test_mysql_decimal_uses_catalogue_precision() {
        let mut c = column("decimal", "decimal(10,2)");
        c.precision = Some(10);
        c.scale = Some(2);
        assert_eq!(
            mysql_column_to_universal_type(&c),
            UniversalType::decimal(10, 2)
        );
    }

    #[test]
    fn test_mysql_string_types() {
        let mut varchar = column("varchar", "varchar(50)");
        varchar.length = Some(50);
        assert_eq!(
            mysql_column_to_universal_type(&varchar),
            UniversalType::varchar(50)
        );
        assert_eq!(
            mysql_column_to_universal_type(&column("char", "char(10)")),
            UniversalType::char(10)
        );
        assert_eq!(
            mysql_column_to_universal_type(&column("longtext", "longtext")),
            UniversalType::Text
        );
    }

    #[test]
    fn test_mysql_enum_and_set() {
        assert_eq!(
            mysql_column_to_universal_type(&column("enum", "enum('small','medium')")),
            UniversalType::enumeration(vec!["small".to_string(), "medium".to_string()])
        );
        assert!(matches!(
            mysql_column_to_universal_type(&column("set", "set('a','b','c')")),
            UniversalType::Set { values } if values.len() == 3
        ));
    }

    #[test]
    fn test_mysql_unknown_type_is_native() {
        assert_eq!(
            mysql_column_to_universal_type(&column("geometry", "geometry")),
            UniversalType::native("mysql", "geometry")
        );
    }

    #[test]
    fn test_extract_length_from_column_type() {
        assert_eq!(extract_length_from_column_type("varchar(255)"), Some(255));
        assert_eq!(extract_length_from_column_type("decimal(10,2)"), Some(10));
        assert_eq!(extract_length_from_column_type("text"), None);
    }
}
