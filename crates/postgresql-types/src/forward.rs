//! Forward conversion: TypedValue → PostgreSQL value
//!
//! tokio-postgres checks every parameter against the server's declared type, so the
//! Rust type is chosen from the column's abstract type rather than from the value.
//! NULLs are bound as a typed `None` for the same reason.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use load_core::{TypedValue, UniversalType, UniversalValue};
use rust_decimal::Decimal;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

/// PostgreSQL value wrapper for type-safe conversions.
#[derive(Debug, Clone, PartialEq)]
pub enum PostgreSQLValue {
    /// Null value of the given column type
    Null(UniversalType),
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without timezone
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    /// Array of text values (PostgreSQL text[])
    TextArray(Vec<Option<String>>),
    /// Array of i64 values (PostgreSQL bigint[])
    Int64Array(Vec<Option<i64>>),
    /// Array of f64 values (PostgreSQL double precision[])
    Float64Array(Vec<Option<f64>>),
    /// Array of boolean values (PostgreSQL boolean[])
    BoolArray(Vec<Option<bool>>),
}

impl From<TypedValue> for PostgreSQLValue {
    fn from(tv: TypedValue) -> Self {
        match (&tv.column_type, tv.value) {
            (t, UniversalValue::Null) => PostgreSQLValue::Null(t.clone()),

            (UniversalType::Bool, v) => match v.as_i64() {
                Some(i) => PostgreSQLValue::Bool(i != 0),
                None => PostgreSQLValue::Text(v.to_string()),
            },

            // Integers are narrowed to the declared column width
            (UniversalType::Int8 { .. } | UniversalType::Int16, UniversalValue::Int(i)) => {
                PostgreSQLValue::Int16(i as i16)
            }
            (UniversalType::Int32, UniversalValue::Int(i)) => PostgreSQLValue::Int32(i as i32),
            (UniversalType::Int64, UniversalValue::Int(i)) => PostgreSQLValue::Int64(i),

            (UniversalType::Float32, UniversalValue::Float(f)) => PostgreSQLValue::Float32(f as f32),
            (UniversalType::Float32, UniversalValue::Int(i)) => PostgreSQLValue::Float32(i as f32),
            (UniversalType::Float64, UniversalValue::Float(f)) => PostgreSQLValue::Float64(f),
            (UniversalType::Float64, UniversalValue::Int(i)) => PostgreSQLValue::Float64(i as f64),

            (UniversalType::Decimal { .. }, UniversalValue::Decimal(d)) => PostgreSQLValue::Decimal(d),
            (UniversalType::Decimal { .. }, UniversalValue::Int(i)) => {
                PostgreSQLValue::Decimal(Decimal::from(i))
            }

            (_, UniversalValue::Bytes(b)) => PostgreSQLValue::Bytes(b),
            (_, UniversalValue::Uuid(u)) => PostgreSQLValue::Uuid(u),
            (_, UniversalValue::Date(d)) => PostgreSQLValue::Date(d),
            (_, UniversalValue::Time(t)) => PostgreSQLValue::Time(t),
            (UniversalType::ZonedDateTime, UniversalValue::DateTime(dt)) => {
                PostgreSQLValue::TimestampTz(dt.and_utc())
            }
            (_, UniversalValue::DateTime(dt)) => PostgreSQLValue::Timestamp(dt),
            (UniversalType::LocalDateTime, UniversalValue::DateTimeTz(dt)) => {
                PostgreSQLValue::Timestamp(dt.naive_utc())
            }
            (_, UniversalValue::DateTimeTz(dt)) => PostgreSQLValue::TimestampTz(dt),

            (UniversalType::Array { element_type }, UniversalValue::Json(json)) => {
                convert_array_to_postgresql(element_type, json)
            }
            (_, UniversalValue::Json(j)) => PostgreSQLValue::Json(j),

            (_, v) => PostgreSQLValue::Text(v.to_string()),
        }
    }
}

fn convert_array_to_postgresql(element_type: &UniversalType, json: serde_json::Value) -> PostgreSQLValue {
    let items = match json {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    match element_type {
        t if t.is_integer() => PostgreSQLValue::Int64Array(items.iter().map(|v| v.as_i64()).collect()),
        UniversalType::Float32 | UniversalType::Float64 => {
            PostgreSQLValue::Float64Array(items.iter().map(|v| v.as_f64()).collect())
        }
        UniversalType::Bool => PostgreSQLValue::BoolArray(items.iter().map(|v| v.as_bool()).collect()),
        _ => PostgreSQLValue::TextArray(
            items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
    }
}

impl PostgreSQLValue {
    /// Box as a tokio-postgres parameter.
    pub fn into_param(self) -> Box<dyn ToSql + Sync + Send> {
        match self {
            PostgreSQLValue::Null(t) => null_param(&t),
            PostgreSQLValue::Bool(v) => Box::new(v),
            PostgreSQLValue::Int16(v) => Box::new(v),
            PostgreSQLValue::Int32(v) => Box::new(v),
            PostgreSQLValue::Int64(v) => Box::new(v),
            PostgreSQLValue::Float32(v) => Box::new(v),
            PostgreSQLValue::Float64(v) => Box::new(v),
            PostgreSQLValue::Decimal(v) => Box::new(v),
            PostgreSQLValue::Text(v) => Box::new(v),
            PostgreSQLValue::Bytes(v) => Box::new(v),
            PostgreSQLValue::Uuid(v) => Box::new(v),
            PostgreSQLValue::Date(v) => Box::new(v),
            PostgreSQLValue::Time(v) => Box::new(v),
            PostgreSQLValue::Timestamp(v) => Box::new(v),
            PostgreSQLValue::TimestampTz(v) => Box::new(v),
            PostgreSQLValue::Json(v) => Box::new(v),
            PostgreSQLValue::TextArray(v) => Box::new(v),
            PostgreSQLValue::Int64Array(v) => Box::new(v),
            PostgreSQLValue::Float64Array(v) => Box::new(v),
            PostgreSQLValue::BoolArray(v) => Box::new(v),
        }
    }
}

fn null_param(column_type: &UniversalType) -> Box<dyn ToSql + Sync + Send> {
    match column_type {
        UniversalType::Bool => Box::new(None::<bool>),
        UniversalType::Int8 { .. } | UniversalType::Int16 => Box::new(None::<i16>),
        UniversalType::Int32 => Box::new(None::<i32>),
        UniversalType::Int64 => Box::new(None::<i64>),
        UniversalType::Float32 => Box::new(None::<f32>),
        UniversalType::Float64 => Box::new(None::<f64>),
        UniversalType::Decimal { .. } => Box::new(None::<Decimal>),
        UniversalType::Bytes => Box::new(None::<Vec<u8>>),
        UniversalType::Date => Box::new(None::<NaiveDate>),
        UniversalType::Time => Box::new(None::<NaiveTime>),
        UniversalType::LocalDateTime => Box::new(None::<NaiveDateTime>),
        UniversalType::ZonedDateTime => Box::new(None::<DateTime<Utc>>),
        UniversalType::Uuid => Box::new(None::<Uuid>),
        UniversalType::Json => Box::new(None::<serde_json::Value>),
        UniversalType::Array { element_type } => match element_type.as_ref() {
            t if t.is_integer() => Box::new(None::<Vec<i64>>),
            UniversalType::Float32 | UniversalType::Float64 => Box::new(None::<Vec<f64>>),
            UniversalType::Bool => Box::new(None::<Vec<bool>>),
            _ => Box::new(None::<Vec<String>>),
        },
        _ => Box::new(None::<String>),
    }
}

/// Convert statement parameters into boxed tokio-postgres parameters.
pub fn to_params(values: &[TypedValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    values
        .iter()
        .cloned()
        .map(|v| PostgreSQLValue::from(v).into_param())
        .collect()
}
