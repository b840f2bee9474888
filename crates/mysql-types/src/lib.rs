//! MySQL dialect and type conversions for load-core types.
//!
//! This crate lets the load engine clone tables into, diff against, and install
//! archive triggers on MySQL databases.
//!
//! # Structure
//!
//! - `dialect`: [`MySqlDialect`], the `Dialect` implementation (DDL, row statements, triggers)
//! - `schema`: INFORMATION_SCHEMA column type → `UniversalType`
//! - `forward`: `TypedValue` → `MySQLValue` (statement parameters)
//! - `reverse`: MySQL values → `UniversalValue` (reading rows)
//!
//! # Example
//!
//! ```rust
//! use load_core::{Dialect, UniversalType};
//! use mysql_types::MySqlDialect;
//!
//! let dialect = MySqlDialect;
//! assert_eq!(dialect.translate_type(&UniversalType::Bool).unwrap(), "TINYINT(1)");
//! ```

pub mod dialect;
pub mod forward;
pub mod reverse;
pub mod schema;

pub use dialect::MySqlDialect;
pub use forward::MySQLValue;
pub use reverse::{mysql_value_to_universal, row_to_values, ConversionError};
pub use schema::mysql_column_to_universal_type;
