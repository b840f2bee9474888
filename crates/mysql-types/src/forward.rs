//! Forward conversion: TypedValue → MySQLValue
//!
//! This module implements `From<TypedValue>` for `MySQLValue`, turning engine-neutral
//! values into statement parameters for `mysql_async`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use load_core::{TypedValue, UniversalType, UniversalValue};
use mysql_async::Value;

/// MySQL value wrapper for type-safe conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct MySQLValue(pub Value);

impl MySQLValue {
    /// Get the inner mysql_async::Value.
    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<TypedValue> for MySQLValue {
    fn from(tv: TypedValue) -> Self {
        let value = match (&tv.column_type, tv.value) {
            (_, UniversalValue::Null) => Value::NULL,

            // Boolean - MySQL uses TINYINT(1)
            (_, UniversalValue::Bool(b)) => Value::Int(i64::from(b)),
            (_, UniversalValue::Int(i)) => Value::Int(i),

            (UniversalType::Float32, UniversalValue::Float(f)) => Value::Float(f as f32),
            (_, UniversalValue::Float(f)) => Value::Double(f),

            // Decimal - sent as text to keep every digit
            (_, UniversalValue::Decimal(d)) => Value::Bytes(d.to_string().into_bytes()),

            (_, UniversalValue::Text(s)) => Value::Bytes(s.into_bytes()),
            (_, UniversalValue::Bytes(b)) => Value::Bytes(b),

            (_, UniversalValue::Date(d)) => Value::Date(
                d.year() as u16,
                d.month() as u8,
                d.day() as u8,
                0,
                0,
                0,
                0,
            ),
            (_, UniversalValue::Time(t)) => Value::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1000,
            ),
            (_, UniversalValue::DateTime(dt)) => datetime_value(&dt),
            // DATETIME has no zone; values are stored as UTC
            (_, UniversalValue::DateTimeTz(dt)) => datetime_value(&dt.naive_utc()),

            // UUID - MySQL stores as CHAR(36)
            (_, UniversalValue::Uuid(u)) => Value::Bytes(u.to_string().into_bytes()),
            (_, UniversalValue::Json(j)) => Value::Bytes(j.to_string().into_bytes()),
        };
        MySQLValue(value)
    }
}

fn datetime_value(dt: &NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1000, // MySQL uses microseconds
    )
}

/// Convert statement parameters for `mysql_async::Params::Positional`.
pub fn to_params(values: &[TypedValue]) -> Vec<Value> {
    values
        .iter()
        .cloned()
        .map(|v| MySQLValue::from(v).into_inner())
        .collect()
}
