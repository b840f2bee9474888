//! Value representations moved between bubbles.
//!
//! Rows read from any engine are decoded into `UniversalValue`s so the diff step can
//! compare a STAGING row held on MySQL with a LIVE row held on SQL Server.

use crate::types::UniversalType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error converting a value into a column's abstract type.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Text could not be parsed as the requested type
    #[error("cannot read '{value}' as {expected}")]
    Unparseable { value: String, expected: String },

    /// The value's kind cannot be stored in the column type
    #[error("cannot store a {actual} value in a {expected} column")]
    Incompatible { actual: String, expected: String },
}

/// Engine-neutral cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UniversalValue {
    /// SQL NULL
    Null,
    /// Boolean / bit
    Bool(bool),
    /// Any integer width
    Int(i64),
    /// Any floating point width
    Float(f64),
    /// Exact numeric
    Decimal(Decimal),
    /// Character data
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Date only
    Date(NaiveDate),
    /// Time only
    Time(NaiveTime),
    /// Timestamp without zone
    DateTime(NaiveDateTime),
    /// Timestamp with zone, normalised to UTC
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON document
    Json(serde_json::Value),
}

impl UniversalValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "date_time",
            Self::DateTimeTz(_) => "timestamp_tz",
            Self::Uuid(_) => "uuid",
            Self::Json(_) => "json",
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Parse text (from a flat file or a driver that only returns strings) into the
    /// value kind of `target`. Empty text is NULL.
    pub fn parse_as(text: &str, target: &UniversalType) -> Result<Self, ValueError> {
        if text.is_empty() {
            return Ok(Self::Null);
        }
        let fail = || ValueError::Unparseable {
            value: text.to_string(),
            expected: target.describe(),
        };
        let trimmed = text.trim();
        let value = match target {
            UniversalType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "y" => Self::Bool(true),
                "0" | "false" | "f" | "no" | "n" => Self::Bool(false),
                _ => return Err(fail()),
            },
            UniversalType::Int8 { .. }
            | UniversalType::Int16
            | UniversalType::Int32
            | UniversalType::Int64 => Self::Int(trimmed.parse().map_err(|_| fail())?),
            UniversalType::Float32 | UniversalType::Float64 => {
                Self::Float(trimmed.parse().map_err(|_| fail())?)
            }
            UniversalType::Decimal { .. } => Self::Decimal(
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|_| fail())?,
            ),
            UniversalType::Date => Self::Date(
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| fail())?,
            ),
            UniversalType::Time => Self::Time(
                NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f").map_err(|_| fail())?,
            ),
            UniversalType::LocalDateTime => Self::DateTime(parse_naive_datetime(trimmed).ok_or_else(fail)?),
            UniversalType::ZonedDateTime => match DateTime::parse_from_rfc3339(trimmed) {
                Ok(dt) => Self::DateTimeTz(dt.with_timezone(&Utc)),
                Err(_) => Self::DateTimeTz(parse_naive_datetime(trimmed).ok_or_else(fail)?.and_utc()),
            },
            UniversalType::Uuid => Self::Uuid(Uuid::parse_str(trimmed).map_err(|_| fail())?),
            UniversalType::Json | UniversalType::Array { .. } => {
                Self::Json(serde_json::from_str(text).map_err(|_| fail())?)
            }
            UniversalType::Bytes => Self::Bytes(decode_hex(trimmed).ok_or_else(fail)?),
            UniversalType::Char { .. }
            | UniversalType::VarChar { .. }
            | UniversalType::Text
            | UniversalType::Enum { .. }
            | UniversalType::Set { .. }
            | UniversalType::Native { .. } => Self::Text(text.to_string()),
        };
        Ok(value)
    }

    /// Reshape a decoded value into the kind expected for `target`.
    ///
    /// Drivers report what the wire carried (MySQL sends most things as bytes, SQL
    /// Server stores JSON in `nvarchar`); this brings the value back to the column's
    /// abstract type so values from different engines compare equal.
    pub fn coerce(self, target: &UniversalType) -> Result<Self, ValueError> {
        let incompatible = |actual: &UniversalValue| ValueError::Incompatible {
            actual: actual.kind().to_string(),
            expected: target.describe(),
        };
        let value = match (target, self) {
            (_, Self::Null) => Self::Null,
            (UniversalType::Bool, Self::Int(i)) => Self::Bool(i != 0),
            (UniversalType::Bool, v @ Self::Bool(_)) => v,
            (t, Self::Bool(b)) if t.is_integer() => Self::Int(i64::from(b)),
            (t, v @ Self::Int(_)) if t.is_integer() => v,
            (UniversalType::Float32 | UniversalType::Float64, Self::Int(i)) => Self::Float(i as f64),
            (UniversalType::Float32 | UniversalType::Float64, v @ Self::Float(_)) => v,
            (UniversalType::Decimal { .. }, Self::Int(i)) => Self::Decimal(Decimal::from(i)),
            (UniversalType::Decimal { .. }, Self::Float(f)) => {
                let original = Self::Float(f);
                Self::Decimal(Decimal::try_from(f).map_err(|_| incompatible(&original))?)
            }
            (UniversalType::Decimal { .. }, v @ Self::Decimal(_)) => v,
            (UniversalType::LocalDateTime, Self::DateTimeTz(dt)) => Self::DateTime(dt.naive_utc()),
            (UniversalType::ZonedDateTime, Self::DateTime(dt)) => Self::DateTimeTz(dt.and_utc()),
            (UniversalType::Date, Self::DateTime(dt)) => Self::Date(dt.date()),
            (UniversalType::Time, Self::DateTime(dt)) => Self::Time(dt.time()),
            (UniversalType::Json | UniversalType::Array { .. }, Self::Bytes(b)) => {
                let text = String::from_utf8_lossy(&b).into_owned();
                Self::parse_as(&text, target)?
            }
            (t, Self::Bytes(b)) if t.is_string() || matches!(t, UniversalType::Set { .. }) => {
                Self::Text(String::from_utf8_lossy(&b).into_owned())
            }
            (UniversalType::Bytes | UniversalType::Native { .. }, v @ Self::Bytes(_)) => v,
            (UniversalType::Bytes, Self::Text(s)) => Self::Bytes(s.into_bytes()),
            (t, Self::Bytes(b)) => {
                let text = String::from_utf8_lossy(&b).into_owned();
                Self::parse_as(&text, t)?
            }
            (t, Self::Text(s)) if !t.is_string() && !matches!(t, UniversalType::Set { .. } | UniversalType::Native { .. }) => {
                Self::parse_as(&s, t)?
            }
            (_, v) => v,
        };
        Ok(value)
    }
}

impl fmt::Display for UniversalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
        }
    }
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// A value together with the abstract type of the column it is bound to.
///
/// Drivers with strict parameter typing (PostgreSQL, SQL Server) need the column type
/// to pick the wire type, including for NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// Column type
    pub column_type: UniversalType,
    /// The value
    pub value: UniversalValue,
}

impl TypedValue {
    /// Create a new typed value.
    pub fn new(column_type: UniversalType, value: UniversalValue) -> Self {
        Self { column_type, value }
    }

    /// A typed text value, used for catalogue lookups.
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(UniversalType::Text, UniversalValue::Text(value.into()))
    }

    /// A typed NULL.
    pub fn null(column_type: UniversalType) -> Self {
        Self::new(column_type, UniversalValue::Null)
    }
}

/// A named value written to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Column name
    pub column: String,
    /// Value bound to the column
    pub value: TypedValue,
}

impl Cell {
    /// Create a new cell.
    pub fn new(column: impl Into<String>, column_type: UniversalType, value: UniversalValue) -> Self {
        Self {
            column: column.into(),
            value: TypedValue::new(column_type, value),
        }
    }
}

/// One row read from a table, in column order.
///
/// Column lookup is case-insensitive because SQL Server and MySQL identifiers are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, UniversalValue)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with(mut self, column: impl Into<String>, value: UniversalValue) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any existing value.
    pub fn set(&mut self, column: impl Into<String>, value: UniversalValue) {
        let column = column.into();
        match self
            .cells
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
        {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Get a column's value.
    pub fn get(&self, column: &str) -> Option<&UniversalValue> {
        self.cells
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Iterate over `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniversalValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Column names in order.
    pub fn columns(&self) -> Vec<&str> {
        self.cells.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// The primary-key values identifying one row, in key column order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTuple(pub Vec<UniversalValue>);

impl KeyTuple {
    /// True if any key part is NULL.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(UniversalValue::is_null)
    }
}

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}
