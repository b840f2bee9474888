//! Execution records for staged-load jobs.
//!
//! Every run of a load recipe opens one [`DataLoadJob`] record, appends a
//! [`TableLoadInfo`] per migrated table, and closes it with an [`ExitCode`]. Closed
//! records are immutable; later runs read them for display and to find out which
//! load last used a RAW/STAGING location. A running job also holds a
//! [`LocationClaim`] on each location it works in.
//!
//! ## Storage Backends
//!
//! - `FilesystemLogStore` - One pretty-printed JSON file per job
//! - `MemoryLogStore` - In-process map, for tests and dry runs

mod filesystem;
mod job;
mod memory;
pub mod store;

#[cfg(test)]
mod tests;

pub use filesystem::FilesystemLogStore;
pub use job::{DataLoadJob, ExitCode, LocationClaim, TableLoadInfo};
pub use memory::MemoryLogStore;
pub use store::LoadLogStore;
