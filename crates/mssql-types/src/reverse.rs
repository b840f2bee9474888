//! Reverse conversion: tiberius row data → UniversalValue

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use load_core::{UniversalType, UniversalValue, ValueError};
use rust_decimal::Decimal;
use thiserror::Error;
use tiberius::{ColumnData, FromSql, Row};

/// Error during SQL Server value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Unsupported SQL Server value: {0}")]
    UnsupportedType(String),
    #[error("Failed to decode value: {0}")]
    Decode(#[from] tiberius::error::Error),
    #[error("Row has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Decode one column value into the abstract type `target`.
pub fn column_data_to_universal(
    data: ColumnData<'static>,
    target: &UniversalType,
) -> Result<UniversalValue, ConversionError> {
    let decoded = match data {
        ColumnData::U8(v) => v.map(|v| UniversalValue::Int(v.into())),
        ColumnData::I16(v) => v.map(|v| UniversalValue::Int(v.into())),
        ColumnData::I32(v) => v.map(|v| UniversalValue::Int(v.into())),
        ColumnData::I64(v) => v.map(UniversalValue::Int),
        ColumnData::F32(v) => v.map(|v| UniversalValue::Float(v.into())),
        ColumnData::F64(v) => v.map(UniversalValue::Float),
        ColumnData::Bit(v) => v.map(UniversalValue::Bool),
        ColumnData::String(v) => v.map(|s| UniversalValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(UniversalValue::Uuid),
        ColumnData::Binary(v) => v.map(|b| UniversalValue::Bytes(b.into_owned())),
        ColumnData::Xml(v) => v.map(|x| UniversalValue::Text(x.into_owned().into_string())),
        other => numeric_or_temporal(&other)?,
    };
    Ok(decoded.unwrap_or(UniversalValue::Null).coerce(target)?)
}

fn numeric_or_temporal(data: &ColumnData<'static>) -> Result<Option<UniversalValue>, ConversionError> {
    let value = match data {
        ColumnData::Numeric(_) => Decimal::from_sql(data)?.map(UniversalValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(UniversalValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(UniversalValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(UniversalValue::Time),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(UniversalValue::DateTimeTz)
        }
        other => return Err(ConversionError::UnsupportedType(format!("{other:?}"))),
    };
    Ok(value)
}

/// Decode a whole row, one abstract type per column.
pub fn row_to_values(row: Row, types: &[UniversalType]) -> Result<Vec<UniversalValue>, ConversionError> {
    if row.len() != types.len() {
        return Err(ConversionError::ColumnCount {
            expected: types.len(),
            actual: row.len(),
        });
    }
    row.into_iter()
        .zip(types)
        .map(|(data, target)| column_data_to_universal(data, target))
        .collect()
}
