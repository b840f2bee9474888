//! Reverse conversion: PostgreSQL value → UniversalValue
//!
//! Values are read with the Rust type matching the column's server type, then
//! coerced into the abstract type the caller expects for that column.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use load_core::{UniversalType, UniversalValue, ValueError};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use uuid::Uuid;

/// Error during PostgreSQL value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Unsupported PostgreSQL type: {0}")]
    UnsupportedType(String),
    #[error("Failed to read column {index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: tokio_postgres::Error,
    },
    #[error("Row has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
}

fn get<'a, T>(row: &'a Row, index: usize) -> Result<Option<T>, ConversionError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(index)
        .map_err(|source| ConversionError::Read { index, source })
}

fn json_array<T: Into<serde_json::Value>>(items: Option<Vec<Option<T>>>) -> UniversalValue {
    match items {
        None => UniversalValue::Null,
        Some(items) => UniversalValue::Json(serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| v.map(Into::into).unwrap_or(serde_json::Value::Null))
                .collect(),
        )),
    }
}

/// Decode column `index` of `row` into the abstract type `target`.
pub fn pg_value_to_universal(
    row: &Row,
    index: usize,
    target: &UniversalType,
) -> Result<UniversalValue, ConversionError> {
    let pg_type = row.columns()[index].type_().clone();
    let value = match &pg_type {
        t if *t == Type::BOOL => get::<bool>(row, index)?.map(UniversalValue::Bool),
        t if *t == Type::INT2 => get::<i16>(row, index)?.map(|i| UniversalValue::Int(i.into())),
        t if *t == Type::INT4 => get::<i32>(row, index)?.map(|i| UniversalValue::Int(i.into())),
        t if *t == Type::INT8 => get::<i64>(row, index)?.map(UniversalValue::Int),
        t if *t == Type::FLOAT4 => get::<f32>(row, index)?.map(|f| UniversalValue::Float(f.into())),
        t if *t == Type::FLOAT8 => get::<f64>(row, index)?.map(UniversalValue::Float),
        t if *t == Type::NUMERIC => get::<Decimal>(row, index)?.map(UniversalValue::Decimal),
        t if *t == Type::TEXT || *t == Type::VARCHAR || *t == Type::BPCHAR || *t == Type::NAME => {
            get::<String>(row, index)?.map(UniversalValue::Text)
        }
        t if *t == Type::BYTEA => get::<Vec<u8>>(row, index)?.map(UniversalValue::Bytes),
        t if *t == Type::DATE => get::<NaiveDate>(row, index)?.map(UniversalValue::Date),
        t if *t == Type::TIME => get::<NaiveTime>(row, index)?.map(UniversalValue::Time),
        t if *t == Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?.map(UniversalValue::DateTime),
        t if *t == Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, index)?.map(UniversalValue::DateTimeTz)
        }
        t if *t == Type::UUID => get::<Uuid>(row, index)?.map(UniversalValue::Uuid),
        t if *t == Type::JSON || *t == Type::JSONB => {
            get::<serde_json::Value>(row, index)?.map(UniversalValue::Json)
        }
        t if *t == Type::TEXT_ARRAY || *t == Type::VARCHAR_ARRAY => {
            Some(json_array(get::<Vec<Option<String>>>(row, index)?))
        }
        t if *t == Type::INT4_ARRAY => Some(json_array(get::<Vec<Option<i32>>>(row, index)?)),
        t if *t == Type::INT8_ARRAY => Some(json_array(get::<Vec<Option<i64>>>(row, index)?)),
        t if *t == Type::FLOAT8_ARRAY => Some(json_array(get::<Vec<Option<f64>>>(row, index)?)),
        t if *t == Type::BOOL_ARRAY => Some(json_array(get::<Vec<Option<bool>>>(row, index)?)),
        other => return Err(ConversionError::UnsupportedType(other.name().to_string())),
    };
    Ok(value.unwrap_or(UniversalValue::Null).coerce(target)?)
}

/// Decode a whole row, one abstract type per column.
pub fn row_to_values(row: &Row, types: &[UniversalType]) -> Result<Vec<UniversalValue>, ConversionError> {
    if row.len() != types.len() {
        return Err(ConversionError::ColumnCount {
            expected: types.len(),
            actual: row.len(),
        });
    }
    types
        .iter()
        .enumerate()
        .map(|(index, target)| pg_value_to_universal(row, index, target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array_keeps_nulls() {
        let value = json_array(Some(vec![Some(1i64), None]));
        assert_eq!(value, UniversalValue::Json(serde_json::json!([1, null])));
        assert_eq!(json_array::<i64>(None), UniversalValue::Null);
    }

    #[test]
    fn test_error_messages() {
        let err = ConversionError::UnsupportedType("inet".to_string());
        assert_eq!(err.to_string(), "Unsupported PostgreSQL type: inet");
        let err = ConversionError::ColumnCount {
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("expected 3"));
    }
}
