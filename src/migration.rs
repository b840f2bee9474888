//! Moving rows from one bubble to the next.
//!
//! [`MigrationColumnSet`] decides which columns identify a row and which are
//! compared; [`OverwriteStrategy`] inserts new keys and updates changed rows.

mod column_set;
mod overwrite;

pub use column_set::{ColumnPair, MigrationColumnSet};
pub use overwrite::{MigrationOutcome, OverwriteStrategy};
