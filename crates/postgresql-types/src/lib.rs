//! PostgreSQL dialect and type conversions for load-core types.
//!
//! PostgreSQL cannot query across databases from one connection, so a load's
//! "database" is realised as a schema inside the connected database.
//!
//! # Modules
//!
//! - [`dialect`] - [`PostgreSqlDialect`], the `Dialect` implementation
//! - [`schema`] - information_schema column type → `UniversalType`
//! - [`forward`] - TypedValue → PostgreSQL parameter conversion
//! - [`reverse`] - PostgreSQL row value → UniversalValue conversion
//!
//! # Example
//!
//! ```
//! use load_core::{Dialect, UniversalType};
//! use postgresql_types::PostgreSqlDialect;
//!
//! let dialect = PostgreSqlDialect;
//! assert_eq!(dialect.translate_type(&UniversalType::Text).unwrap(), "TEXT");
//! ```

pub mod dialect;
pub mod forward;
pub mod reverse;
pub mod schema;

pub use dialect::PostgreSqlDialect;
pub use forward::PostgreSQLValue;
pub use reverse::{pg_value_to_universal, row_to_values, ConversionError};
pub use schema::postgresql_column_to_universal_type;
