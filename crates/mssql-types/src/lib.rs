//! SQL Server dialect and type conversions for load-core types.
//!
//! # Structure
//!
//! - `dialect`: [`MssqlDialect`], the `Dialect` implementation. Statements that must
//!   run inside a specific database (CREATE TRIGGER) go through
//!   `[db].sys.sp_executesql`.
//! - `schema`: `sys.types` name → `UniversalType`
//! - `forward`: `TypedValue` → `MssqlValue` bound onto a `tiberius::Query`
//! - `reverse`: `tiberius::Row` → `UniversalValue`
//!
//! # Example
//!
//! ```
//! use load_core::{Dialect, UniversalType};
//! use mssql_types::MssqlDialect;
//!
//! let dialect = MssqlDialect;
//! assert_eq!(dialect.translate_type(&UniversalType::LocalDateTime).unwrap(), "DATETIME2");
//! ```

pub mod dialect;
pub mod forward;
pub mod reverse;
pub mod schema;

pub use dialect::MssqlDialect;
pub use forward::MssqlValue;
pub use reverse::{column_data_to_universal, row_to_values, ConversionError};
pub use schema::mssql_column_to_universal_type;
