//! Bubble naming conventions.
//!
//! A namer maps a LIVE database/table name to the name it has in a given bubble.
//! Namers are pure: the same inputs always give the same outputs for the lifetime of
//! a job, otherwise cleanup would drop the wrong database.

use crate::bubble::{archive_table_name, Bubble};

/// Maps root names to per-bubble names.
pub trait BubbleNamer: Send + Sync {
    /// Database name of `root` in `bubble`.
    fn database_name(&self, root: &str, bubble: Bubble) -> String;

    /// Table name of `table` in `bubble`.
    fn table_name(&self, table: &str, bubble: Bubble) -> String;

    /// True when the namer routes `bubble` to a pre-existing location that is emptied
    /// and reused rather than created and dropped.
    fn reuses_location(&self, _bubble: Bubble) -> bool {
        false
    }

    /// True when two jobs can never share this namer's RAW/STAGING names.
    fn is_job_scoped(&self) -> bool {
        false
    }
}

/// Default convention: `root_RAW`, `root_STAGING`; table names unchanged except the
/// archive shadow, which is `<Table>_Archive`.
#[derive(Debug, Clone, Default)]
pub struct SuffixNamer;

impl BubbleNamer for SuffixNamer {
    fn database_name(&self, root: &str, bubble: Bubble) -> String {
        match bubble {
            Bubble::Raw => format!("{root}_RAW"),
            Bubble::Staging => format!("{root}_STAGING"),
            Bubble::Live | Bubble::Archive => root.to_string(),
        }
    }

    fn table_name(&self, table: &str, bubble: Bubble) -> String {
        match bubble {
            Bubble::Archive => archive_table_name(table),
            _ => table.to_string(),
        }
    }
}

/// Gives every job its own RAW/STAGING databases so concurrent jobs never collide.
#[derive(Debug, Clone)]
pub struct JobScopedNamer {
    job_id: i64,
}

impl JobScopedNamer {
    /// Create a namer for one job.
    pub fn new(job_id: i64) -> Self {
        Self { job_id }
    }
}

impl BubbleNamer for JobScopedNamer {
    fn database_name(&self, root: &str, bubble: Bubble) -> String {
        match bubble {
            Bubble::Raw => format!("{root}_RAW_{}", self.job_id),
            Bubble::Staging => format!("{root}_STAGING_{}", self.job_id),
            Bubble::Live | Bubble::Archive => root.to_string(),
        }
    }

    fn table_name(&self, table: &str, bubble: Bubble) -> String {
        SuffixNamer.table_name(table, bubble)
    }

    fn is_job_scoped(&self) -> bool {
        true
    }
}

/// Routes RAW and STAGING to operator-chosen databases, typically on a separate
/// low-privilege server. Those databases are reused across runs.
#[derive(Debug, Clone)]
pub struct FixedNamer {
    raw: String,
    staging: String,
}

impl FixedNamer {
    /// Create a namer with fixed RAW and STAGING database names.
    pub fn new(raw: impl Into<String>, staging: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            staging: staging.into(),
        }
    }
}

impl BubbleNamer for FixedNamer {
    fn database_name(&self, root: &str, bubble: Bubble) -> String {
        match bubble {
            Bubble::Raw => self.raw.clone(),
            Bubble::Staging => self.staging.clone(),
            Bubble::Live | Bubble::Archive => root.to_string(),
        }
    }

    fn table_name(&self, table: &str, bubble: Bubble) -> String {
        SuffixNamer.table_name(table, bubble)
    }

    fn reuses_location(&self, bubble: Bubble) -> bool {
        bubble.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_namer() {
        let namer = SuffixNamer;
        assert_eq!(namer.database_name("Clinical", Bubble::Raw), "Clinical_RAW");
        assert_eq!(namer.database_name("Clinical", Bubble::Staging), "Clinical_STAGING");
        assert_eq!(namer.database_name("Clinical", Bubble::Live), "Clinical");
        assert_eq!(namer.database_name("Clinical", Bubble::Archive), "Clinical");
        assert_eq!(namer.table_name("People", Bubble::Raw), "People");
        assert_eq!(namer.table_name("People", Bubble::Archive), "People_Archive");
        assert!(!namer.reuses_location(Bubble::Raw));
    }

    #[test]
    fn test_suffix_namer_is_deterministic() {
        let namer = SuffixNamer;
        let first = namer.database_name("Clinical", Bubble::Staging);
        let second = namer.database_name("Clinical", Bubble::Staging);
        assert_eq!(first, second);
    }

    #[test]
    fn test_job_scoped_namer() {
        let namer = JobScopedNamer::new(42);
        assert_eq!(namer.database_name("Clinical", Bubble::Raw), "Clinical_RAW_42");
        assert_eq!(namer.database_name("Clinical", Bubble::Live), "Clinical");
        assert!(namer.is_job_scoped());
    }

    #[test]
    fn test_fixed_namer() {
        let namer = FixedNamer::new("LoadArea", "LoadStaging");
        assert_eq!(namer.database_name("Clinical", Bubble::Raw), "LoadArea");
        assert_eq!(namer.database_name("Clinical", Bubble::Staging), "LoadStaging");
        assert!(namer.reuses_location(Bubble::Staging));
        assert!(!namer.reuses_location(Bubble::Live));
    }
}
