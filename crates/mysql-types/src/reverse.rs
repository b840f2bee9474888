//! Reverse conversion: MySQL values → UniversalValue
//!
//! The binary protocol reports what the wire carried (DECIMAL and VARCHAR both arrive
//! as bytes), so every value is decoded and then coerced into the abstract type of the
//! column it was read from.

use chrono::{NaiveDate, NaiveTime};
use load_core::{UniversalType, UniversalValue, ValueError};
use mysql_async::{Row, Value};
use thiserror::Error;

/// Error during MySQL value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Invalid date/time value: {0:?}")]
    InvalidDateTime(Value),
    #[error("Unsigned value {0} does not fit a signed 64-bit integer")]
    UnsignedOverflow(u64),
    #[error("Row has {actual} columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Decode one MySQL value into the abstract type of its column.
pub fn mysql_value_to_universal(
    value: Value,
    target: &UniversalType,
) -> Result<UniversalValue, ConversionError> {
    let decoded = match value {
        Value::NULL => UniversalValue::Null,
        Value::Int(i) => UniversalValue::Int(i),
        Value::UInt(u) => {
            UniversalValue::Int(i64::try_from(u).map_err(|_| ConversionError::UnsignedOverflow(u))?)
        }
        Value::Float(f) => UniversalValue::Float(f64::from(f)),
        Value::Double(f) => UniversalValue::Float(f),
        Value::Bytes(b) => UniversalValue::Bytes(b),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
                .ok_or(ConversionError::InvalidDateTime(value.clone()))?;
            let time = NaiveTime::from_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                .ok_or(ConversionError::InvalidDateTime(value.clone()))?;
            UniversalValue::DateTime(date.and_time(time))
        }
        Value::Time(negative, days, hour, minute, second, micros) => {
            if negative || days > 0 {
                return Err(ConversionError::InvalidDateTime(value));
            }
            let time = NaiveTime::from_hms_micro_opt(hour.into(), minute.into(), second.into(), micros)
                .ok_or(ConversionError::InvalidDateTime(value.clone()))?;
            UniversalValue::Time(time)
        }
    };
    Ok(decoded.coerce(target)?)
}

/// Decode a whole row, one abstract type per column.
pub fn row_to_values(row: Row, types: &[UniversalType]) -> Result<Vec<UniversalValue>, ConversionError> {
    let values = row.unwrap();
    if values.len() != types.len() {
        return Err(ConversionError::ColumnCount {
            expected: types.len(),
            actual: values.len(),
        });
    }
    values
        .into_iter()
        .zip(types)
        .map(|(value, target)| mysql_value_to_universal(value, target))
        .collect()
}
