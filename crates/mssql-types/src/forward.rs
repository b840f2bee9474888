//! Forward conversion: TypedValue → MssqlValue
//!
//! SQL Server infers a parameter's type from the bound Rust type, so the variant is
//! chosen from the column's abstract type and NULLs are bound as a typed `None`.
//! Decimals go over the wire as tiberius `Numeric` (mantissa and scale).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use load_core::{TypedValue, UniversalType, UniversalValue};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::Query;
use uuid::Uuid;

/// SQL Server parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum MssqlValue {
    /// Null value of the given column type
    Null(UniversalType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Binary(Vec<u8>),
    Guid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<Utc>),
}

impl From<TypedValue> for MssqlValue {
    fn from(tv: TypedValue) -> Self {
        match (&tv.column_type, tv.value) {
            (t, UniversalValue::Null) => MssqlValue::Null(t.clone()),

            (_, UniversalValue::Bool(b)) => MssqlValue::Bool(b),
            (UniversalType::Bool, UniversalValue::Int(i)) => MssqlValue::Bool(i != 0),
            (UniversalType::Int8 { .. } | UniversalType::Int16, UniversalValue::Int(i)) => {
                MssqlValue::I16(i as i16)
            }
            (UniversalType::Int32, UniversalValue::Int(i)) => MssqlValue::I32(i as i32),
            (UniversalType::Decimal { .. }, UniversalValue::Int(i)) => {
                MssqlValue::Decimal(Decimal::from(i))
            }
            (_, UniversalValue::Int(i)) => MssqlValue::I64(i),

            (UniversalType::Float32, UniversalValue::Float(f)) => MssqlValue::F32(f as f32),
            (_, UniversalValue::Float(f)) => MssqlValue::F64(f),
            (_, UniversalValue::Decimal(d)) => MssqlValue::Decimal(d),

            (_, UniversalValue::Text(s)) => MssqlValue::String(s),
            (_, UniversalValue::Bytes(b)) => MssqlValue::Binary(b),
            (_, UniversalValue::Uuid(u)) => MssqlValue::Guid(u),
            (_, UniversalValue::Date(d)) => MssqlValue::Date(d),
            (_, UniversalValue::Time(t)) => MssqlValue::Time(t),
            (UniversalType::ZonedDateTime, UniversalValue::DateTime(dt)) => {
                MssqlValue::DateTimeOffset(dt.and_utc())
            }
            (_, UniversalValue::DateTime(dt)) => MssqlValue::DateTime(dt),
            (UniversalType::LocalDateTime, UniversalValue::DateTimeTz(dt)) => {
                MssqlValue::DateTime(dt.naive_utc())
            }
            (_, UniversalValue::DateTimeTz(dt)) => MssqlValue::DateTimeOffset(dt),
            // JSON lives in NVARCHAR(MAX)
            (_, UniversalValue::Json(j)) => MssqlValue::String(j.to_string()),
        }
    }
}

impl MssqlValue {
    /// Bind as the next positional parameter of `query`.
    pub fn bind(self, query: &mut Query<'_>) {
        match self {
            MssqlValue::Null(t) => bind_null(query, &t),
            MssqlValue::Bool(v) => query.bind(v),
            MssqlValue::I16(v) => query.bind(v),
            MssqlValue::I32(v) => query.bind(v),
            MssqlValue::I64(v) => query.bind(v),
            MssqlValue::F32(v) => query.bind(v),
            MssqlValue::F64(v) => query.bind(v),
            MssqlValue::Decimal(v) => query.bind(to_numeric(v)),
            MssqlValue::String(v) => query.bind(v),
            MssqlValue::Binary(v) => query.bind(v),
            MssqlValue::Guid(v) => query.bind(v),
            MssqlValue::Date(v) => query.bind(v),
            MssqlValue::Time(v) => query.bind(v),
            MssqlValue::DateTime(v) => query.bind(v),
            MssqlValue::DateTimeOffset(v) => query.bind(v),
        }
    }
}

/// SQL Server numeric with the decimal's digits and scale.
pub fn to_numeric(value: Decimal) -> Numeric {
    // rust_decimal caps scale at 28, well inside u8
    Numeric::new_with_scale(value.mantissa(), value.scale() as u8)
}

fn bind_null(query: &mut Query<'_>, column_type: &UniversalType) {
    match column_type {
        UniversalType::Bool => query.bind(None::<bool>),
        UniversalType::Int8 { .. } | UniversalType::Int16 => query.bind(None::<i16>),
        UniversalType::Int32 => query.bind(None::<i32>),
        UniversalType::Int64 => query.bind(None::<i64>),
        UniversalType::Float32 => query.bind(None::<f32>),
        UniversalType::Float64 => query.bind(None::<f64>),
        UniversalType::Decimal { .. } => query.bind(None::<Numeric>),
        UniversalType::Bytes => query.bind(None::<Vec<u8>>),
        UniversalType::Uuid => query.bind(None::<Uuid>),
        UniversalType::Date => query.bind(None::<NaiveDate>),
        UniversalType::Time => query.bind(None::<NaiveTime>),
        // datetime2 converts implicitly to datetimeoffset
        UniversalType::LocalDateTime | UniversalType::ZonedDateTime => {
            query.bind(None::<NaiveDateTime>)
        }
        _ => query.bind(None::<String>),
    }
}

/// Bind every parameter of a statement, in order.
pub fn bind_all(query: &mut Query<'_>, values: &[TypedValue]) {
    for value in values.iter().cloned() {
        MssqlValue::from(value).bind(query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_width_follows_column() {
        let v: MssqlValue = TypedValue::new(UniversalType::Int32, UniversalValue::Int(18)).into();
        assert_eq!(v, MssqlValue::I32(18));
        let v: MssqlValue = TypedValue::new(UniversalType::Int64, UniversalValue::Int(18)).into();
        assert_eq!(v, MssqlValue::I64(18));
        let v: MssqlValue = TypedValue::new(UniversalType::Bool, UniversalValue::Int(1)).into();
        assert_eq!(v, MssqlValue::Bool(true));
    }

    #[test]
    fn test_null_and_json() {
        let v: MssqlValue = TypedValue::null(UniversalType::Date).into();
        assert_eq!(v, MssqlValue::Null(UniversalType::Date));

        let v: MssqlValue =
            TypedValue::new(UniversalType::Json, UniversalValue::Json(serde_json::json!({"a": 1})))
                .into();
        assert_eq!(v, MssqlValue::String("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_decimal_binds_as_numeric() {
        let price = Decimal::new(-123456, 3);
        let v: MssqlValue =
            TypedValue::new(UniversalType::decimal(10, 3), UniversalValue::Decimal(price)).into();
        assert_eq!(v, MssqlValue::Decimal(price));

        let numeric = to_numeric(price);
        assert_eq!(numeric.value(), -123456);
        assert_eq!(numeric.scale(), 3);
        assert_eq!(to_numeric(Decimal::from(32)).value(), 32);

        let mut query = Query::new("SELECT @P1, @P2, @P3");
        bind_all(
            &mut query,
            &[
                TypedValue::new(UniversalType::decimal(10, 3), UniversalValue::Decimal(price)),
                TypedValue::new(UniversalType::decimal(10, 0), UniversalValue::Int(7)),
                TypedValue::null(UniversalType::decimal(10, 3)),
            ],
        );
    }

    #[test]
    fn test_bind_all_counts_parameters() {
        let mut query = Query::new("SELECT @P1, @P2");
        bind_all(
            &mut query,
            &[
                TypedValue::text("Dave"),
                TypedValue::null(UniversalType::Int32),
            ],
        );
    }
}
