//! Oracle dialect for load-core types.
//!
//! Oracle has no databases in the MySQL/SQL Server sense, so a bubble database is an
//! Oracle user (schema) created without a password. Only the SQL side exists here;
//! the load engine ships no Oracle driver, so these statements are rendered for
//! operators and tests.
//!
//! # Example
//!
//! ```
//! use load_core::{Dialect, TableRef};
//! use oracle_types::OracleDialect;
//!
//! let dialect = OracleDialect;
//! let table = TableRef::new("Clinical_RAW", None, "People");
//! assert_eq!(dialect.qualify(&table), "\"CLINICAL_RAW\".\"PEOPLE\"");
//! ```

pub mod dialect;
pub mod schema;

pub use dialect::OracleDialect;
pub use schema::oracle_column_to_universal_type;
