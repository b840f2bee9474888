//! Job orchestration: pre-flight checks, the state machine, the load directory, and
//! the orchestrator that moves data RAW → STAGING → LIVE.

mod context;
mod directory;
mod orchestrator;
mod preflight;
mod state;

pub use context::{JobContext, TablePlan};
pub use directory::{JobLock, LoadDirectory};
pub use orchestrator::{DataLoadOrchestrator, RunReport};
pub use preflight::run_checks;
pub use state::JobState;
