//! Abstract column types shared by every bubble.
//!
//! `UniversalType` is the engine-neutral description of a column. A LIVE table is
//! discovered on one engine, described with these types, and then translated into the
//! concrete type strings of whichever engine hosts RAW and STAGING.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Engine-neutral column type.
///
/// # YAML Format
///
/// Simple types can be specified as strings:
/// ```yaml
/// type: int
/// type: text
/// ```
///
/// Parameterised types use object format:
/// ```yaml
/// type:
///   type: var_char
///   length: 50
/// type:
///   type: decimal
///   precision: 10
///   scale: 2
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum UniversalType {
    // Boolean
    /// Boolean value
    Bool,

    // Integer types (sized)
    /// 8-bit integer, `width` is the MySQL display width
    Int8 {
        /// Display width
        width: u8,
    },

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    // Floating point
    /// 32-bit IEEE 754 floating point
    Float32,

    /// 64-bit IEEE 754 floating point
    Float64,

    // Exact numeric
    /// Exact decimal with specified precision and scale
    Decimal {
        /// Total number of digits
        precision: u8,
        /// Number of digits after the decimal point
        scale: u8,
    },

    // String types
    /// Fixed-length character string
    Char {
        /// Maximum length
        length: u16,
    },

    /// Variable-length character string with max length
    VarChar {
        /// Maximum length
        length: u16,
    },

    /// Unlimited text
    Text,

    // Binary types
    /// Binary data
    Bytes,

    // Temporal types
    /// Date only (YYYY-MM-DD)
    Date,

    /// Time only (HH:MM:SS)
    Time,

    /// Timestamp without timezone
    LocalDateTime,

    /// Timestamp with timezone
    ZonedDateTime,

    // Special types
    /// UUID (128-bit)
    Uuid,

    /// JSON document
    Json,

    // Collection types
    /// Array of a specific type
    Array {
        /// Element type
        element_type: Box<UniversalType>,
    },

    /// MySQL SET type
    Set {
        /// Allowed values
        values: Vec<String>,
    },

    // Enumeration
    /// Enumeration type
    Enum {
        /// Allowed values
        values: Vec<String>,
    },

    /// An engine type with no abstract equivalent (e.g. `hierarchyid`, `inet`).
    ///
    /// Only the engine it was discovered on can express it again.
    Native {
        /// Engine the type belongs to (`mssql`, `mysql`, `postgresql`, `oracle`)
        dialect: String,
        /// Type name as reported by the catalogue
        type_name: String,
    },
}

// Supports both simple string format ("int") and object format ({"type": "var_char", "length": 50})

impl Serialize for UniversalType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        match self {
            Self::Bool => serializer.serialize_str("bool"),
            Self::Int16 => serializer.serialize_str("small_int"),
            Self::Int32 => serializer.serialize_str("int"),
            Self::Int64 => serializer.serialize_str("big_int"),
            Self::Float32 => serializer.serialize_str("float"),
            Self::Float64 => serializer.serialize_str("double"),
            Self::Text => serializer.serialize_str("text"),
            Self::Bytes => serializer.serialize_str("bytes"),
            Self::Date => serializer.serialize_str("date"),
            Self::Time => serializer.serialize_str("time"),
            Self::LocalDateTime => serializer.serialize_str("date_time"),
            Self::ZonedDateTime => serializer.serialize_str("timestamp_tz"),
            Self::Uuid => serializer.serialize_str("uuid"),
            Self::Json => serializer.serialize_str("json"),

            Self::Int8 { width } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "tiny_int")?;
                map.serialize_entry("width", width)?;
                map.end()
            }
            Self::Decimal { precision, scale } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "decimal")?;
                map.serialize_entry("precision", precision)?;
                map.serialize_entry("scale", scale)?;
                map.end()
            }
            Self::Char { length } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "char")?;
                map.serialize_entry("length", length)?;
                map.end()
            }
            Self::VarChar { length } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "var_char")?;
                map.serialize_entry("length", length)?;
                map.end()
            }
            Self::Array { element_type } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("element_type", element_type)?;
                map.end()
            }
            Self::Set { values } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "set")?;
                map.serialize_entry("values", values)?;
                map.end()
            }
            Self::Enum { values } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "enum")?;
                map.serialize_entry("values", values)?;
                map.end()
            }
            Self::Native { dialect, type_name } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "native")?;
                map.serialize_entry("dialect", dialect)?;
                map.serialize_entry("type_name", type_name)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for UniversalType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{Error, MapAccess, Visitor};

        struct UniversalTypeVisitor;

        impl<'de> Visitor<'de> for UniversalTypeVisitor {
            type Value = UniversalType;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or map representing a UniversalType")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                simple_type(value).ok_or_else(|| E::custom(format!("unknown simple type: {value}")))
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut type_name: Option<String> = None;
                let mut fields: HashMap<String, serde_yaml::Value> = HashMap::new();

                while let Some(key) = map.next_key::<String>()? {
                    if key == "type" {
                        type_name = Some(map.next_value()?);
                    } else {
                        fields.insert(key, map.next_value()?);
                    }
                }

                let type_name = type_name.ok_or_else(|| M::Error::missing_field("type"))?;

                if let Some(simple) = simple_type(&type_name) {
                    return Ok(simple);
                }

                match type_name.as_str() {
                    "tiny_int" | "tinyint" => {
                        let width = get_field(&fields, "width").unwrap_or(4);
                        Ok(UniversalType::Int8 { width })
                    }
                    "decimal" => {
                        let precision = get_field_required(&fields, "precision")?;
                        let scale = get_field_required(&fields, "scale")?;
                        Ok(UniversalType::Decimal { precision, scale })
                    }
                    "char" => {
                        let length = get_field_required(&fields, "length")?;
                        Ok(UniversalType::Char { length })
                    }
                    "var_char" | "varchar" => {
                        let length = get_field_required(&fields, "length")?;
                        Ok(UniversalType::VarChar { length })
                    }
                    "array" => {
                        let element_type: UniversalType =
                            get_field_required(&fields, "element_type")?;
                        Ok(UniversalType::Array {
                            element_type: Box::new(element_type),
                        })
                    }
                    "set" => {
                        let values = get_field_required(&fields, "values")?;
                        Ok(UniversalType::Set { values })
                    }
                    "enum" => {
                        let values = get_field_required(&fields, "values")?;
                        Ok(UniversalType::Enum { values })
                    }
                    "native" => {
                        let dialect = get_field_required(&fields, "dialect")?;
                        let type_name = get_field_required(&fields, "type_name")?;
                        Ok(UniversalType::Native { dialect, type_name })
                    }
                    _ => Err(M::Error::custom(format!("unknown type: {type_name}"))),
                }
            }
        }

        deserializer.deserialize_any(UniversalTypeVisitor)
    }
}

fn simple_type(value: &str) -> Option<UniversalType> {
    let parsed = match value {
        "bool" => UniversalType::Bool,
        "small_int" | "smallint" => UniversalType::Int16,
        "int" => UniversalType::Int32,
        "big_int" | "bigint" => UniversalType::Int64,
        "float" => UniversalType::Float32,
        "double" => UniversalType::Float64,
        "text" => UniversalType::Text,
        "bytes" => UniversalType::Bytes,
        "date" => UniversalType::Date,
        "time" => UniversalType::Time,
        "date_time" | "datetime" => UniversalType::LocalDateTime,
        "timestamp_tz" | "timestamptz" => UniversalType::ZonedDateTime,
        "uuid" => UniversalType::Uuid,
        "json" => UniversalType::Json,
        _ => return None,
    };
    Some(parsed)
}

fn get_field<T: for<'de> Deserialize<'de>>(
    fields: &HashMap<String, serde_yaml::Value>,
    key: &str,
) -> Option<T> {
    fields
        .get(key)
        .and_then(|v| serde_yaml::from_value(v.clone()).ok())
}

fn get_field_required<T: for<'de> Deserialize<'de>, E: serde::de::Error>(
    fields: &HashMap<String, serde_yaml::Value>,
    key: &'static str,
) -> Result<T, E> {
    let value = fields.get(key).ok_or_else(|| E::missing_field(key))?;
    serde_yaml::from_value(value.clone())
        .map_err(|e| E::custom(format!("invalid field '{key}': {e}")))
}

impl UniversalType {
    /// Create a new Decimal type with the given precision and scale.
    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self::Decimal { precision, scale }
    }

    /// Create a new Char type with the given length.
    pub fn char(length: u16) -> Self {
        Self::Char { length }
    }

    /// Create a new VarChar type with the given length.
    pub fn varchar(length: u16) -> Self {
        Self::VarChar { length }
    }

    /// Create a new Array type with the given element type.
    pub fn array(element_type: UniversalType) -> Self {
        Self::Array {
            element_type: Box::new(element_type),
        }
    }

    /// Create a new Enum type with the given values.
    pub fn enumeration(values: Vec<String>) -> Self {
        Self::Enum { values }
    }

    /// Create an engine-specific type.
    pub fn native(dialect: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::Native {
            dialect: dialect.into(),
            type_name: type_name.into(),
        }
    }

    /// Check if this type represents an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8 { .. } | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    /// Check if this type represents a numeric type.
    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(self, Self::Float32 | Self::Float64 | Self::Decimal { .. })
    }

    /// Check if this type represents a string type subject to collation.
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            Self::Char { .. } | Self::VarChar { .. } | Self::Text | Self::Enum { .. }
        )
    }

    /// Check if this type represents a temporal type.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Date | Self::Time | Self::LocalDateTime | Self::ZonedDateTime
        )
    }

    /// Short human-readable name used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int8 { width } => format!("tiny_int({width})"),
            Self::Int16 => "small_int".to_string(),
            Self::Int32 => "int".to_string(),
            Self::Int64 => "big_int".to_string(),
            Self::Float32 => "float".to_string(),
            Self::Float64 => "double".to_string(),
            Self::Decimal { precision, scale } => format!("decimal({precision},{scale})"),
            Self::Char { length } => format!("char({length})"),
            Self::VarChar { length } => format!("var_char({length})"),
            Self::Text => "text".to_string(),
            Self::Bytes => "bytes".to_string(),
            Self::Date => "date".to_string(),
            Self::Time => "time".to_string(),
            Self::LocalDateTime => "date_time".to_string(),
            Self::ZonedDateTime => "timestamp_tz".to_string(),
            Self::Uuid => "uuid".to_string(),
            Self::Json => "json".to_string(),
            Self::Array { element_type } => format!("array<{}>", element_type.describe()),
            Self::Set { .. } => "set".to_string(),
            Self::Enum { .. } => "enum".to_string(),
            Self::Native { dialect, type_name } => format!("{dialect}:{type_name}"),
        }
    }
}
