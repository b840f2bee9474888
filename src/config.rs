//! Load recipes.
//!
//! A recipe (`LoadMetadata`) names the LIVE tables of one recurring load, where the
//! files arrive, which servers host RAW/STAGING and what to do with them afterwards.
//! Recipes are YAML; a `.toml` extension selects TOML instead.
//!
//! ```yaml
//! name: Clinical
//! load_directory: /data/loads/clinical
//! live:
//!   engine: mssql
//!   host: live-sql
//!   user: loader
//!   password_env: CLINICAL_LIVE_PASSWORD
//! tables:
//!   - database: Clinical
//!     schema: dbo
//!     table: People
//!     ignore_pattern: "^FavouriteColour$"
//! trigger_timeout: 30s
//! components:
//!   - type: csv
//!     table: People
//!     pattern: "people_*.csv"
//! ```

pub mod duration;

use crate::error::{LoadError, Result};
use load_core::{BubbleNamer, ColumnDefinition, Engine, FixedNamer, JobScopedNamer, SuffixNamer, TableRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use duration::{parse_duration_to_secs, parse_timeout};

/// Connection to one database server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine
    pub engine: Engine,
    /// Host name
    pub host: String,
    /// Port; the engine's default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// Login name
    #[serde(default)]
    pub user: Option<String>,
    /// Password in clear text
    #[serde(default)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Database to connect to initially (PostgreSQL requires one)
    #[serde(default)]
    pub database: Option<String>,
    /// Accept the server certificate without validation (SQL Server)
    #[serde(default)]
    pub trust_cert: bool,
    /// Require an encrypted connection (SQL Server)
    #[serde(default)]
    pub encrypt: bool,
}

impl ConnectionConfig {
    /// Port to connect to.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.engine {
            Engine::MicrosoftSqlServer => 1433,
            Engine::MySql => 3306,
            Engine::PostgreSql => 5432,
            Engine::Oracle => 1521,
        })
    }

    /// The password, read from the environment when `password_env` is set.
    pub fn resolve_password(&self) -> Result<Option<String>> {
        match &self.password_env {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                LoadError::MissingCredentials(format!(
                    "{} (environment variable {var} is not set)",
                    self.describe()
                ))
            }),
            None => Ok(self.password.clone()),
        }
    }

    /// Connection URL with the given password. Only ever log it through
    /// `sanitize_connection_string`.
    pub fn connection_string(&self, password: Option<&str>) -> String {
        let credentials = match (&self.user, password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (Some(user), None) => format!("{user}@"),
            _ => String::new(),
        };
        let database = self.database.as_deref().unwrap_or("");
        format!(
            "{}://{credentials}{}:{}/{database}",
            self.engine,
            self.host,
            self.port()
        )
    }

    /// Human readable server description without secrets.
    pub fn describe(&self) -> String {
        self.connection_string(None)
    }

    /// `engine://host:port`, identifying the server whatever the login.
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.engine, self.host.to_lowercase(), self.port())
    }
}

/// Which bubble naming convention to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// `root_RAW`, `root_STAGING`
    #[default]
    Suffix,
    /// `root_RAW_<job>`, `root_STAGING_<job>`
    JobScoped,
    /// Operator-chosen RAW and STAGING databases
    Fixed,
}

/// Bubble naming section of a recipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub convention: NamingConvention,
    /// RAW database for the `fixed` convention
    #[serde(default)]
    pub raw: Option<String>,
    /// STAGING database for the `fixed` convention
    #[serde(default)]
    pub staging: Option<String>,
}

impl NamingConfig {
    /// Build the namer for one job.
    pub fn namer(&self, job_id: i64) -> Result<Box<dyn BubbleNamer>> {
        match self.convention {
            NamingConvention::Suffix => Ok(Box::new(SuffixNamer)),
            NamingConvention::JobScoped => Ok(Box::new(JobScopedNamer::new(job_id))),
            NamingConvention::Fixed => match (&self.raw, &self.staging) {
                (Some(raw), Some(staging)) => Ok(Box::new(FixedNamer::new(raw, staging))),
                _ => Err(LoadError::config(
                    "naming convention 'fixed' requires both 'raw' and 'staging' database names",
                )),
            },
        }
    }
}

/// One LIVE table taking part in the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub database: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Columns matching this regex are copied but never trigger an update
    #[serde(default)]
    pub ignore_pattern: Option<String>,
    /// RAW-only columns dropped before STAGING
    #[serde(default)]
    pub discarded_columns: Vec<ColumnDefinition>,
}

impl TableConfig {
    /// The LIVE table.
    pub fn live_ref(&self) -> TableRef {
        TableRef::new(self.database.clone(), self.schema.clone(), self.table.clone())
    }
}

/// What happens to a RAW or STAGING database once the job ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposal {
    Drop,
    Retain,
}

/// RAW/STAGING disposal on success and on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisposalPolicy {
    #[serde(default = "default_on_success")]
    pub on_success: Disposal,
    #[serde(default = "default_on_failure")]
    pub on_failure: Disposal,
}

impl Default for DisposalPolicy {
    fn default() -> Self {
        Self {
            on_success: default_on_success(),
            on_failure: default_on_failure(),
        }
    }
}

fn default_on_success() -> Disposal {
    Disposal::Drop
}

fn default_on_failure() -> Disposal {
    Disposal::Retain
}

/// Delimited file attacher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvComponentConfig {
    /// LIVE table name the files populate
    pub table: String,
    /// File name glob inside `ForLoading`
    #[serde(default = "default_csv_pattern")]
    pub pattern: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_has_headers")]
    pub has_headers: bool,
}

fn default_csv_pattern() -> String {
    "*.csv".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_has_headers() -> bool {
    true
}

/// A component that populates RAW.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentConfig {
    Csv(CsvComponentConfig),
}

fn default_trigger_timeout() -> String {
    "30s".to_string()
}

fn default_statement_retries() -> u32 {
    3
}

/// A recurring load recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMetadata {
    /// Recipe name, recorded on every job
    pub name: String,
    /// Root of `Data/ForLoading` and `Data/ForArchiving`
    pub load_directory: PathBuf,
    /// Server holding the LIVE tables
    pub live: ConnectionConfig,
    /// Server holding RAW and STAGING; LIVE's server when absent
    #[serde(default)]
    pub staging_server: Option<ConnectionConfig>,
    #[serde(default)]
    pub naming: NamingConfig,
    pub tables: Vec<TableConfig>,
    /// Diff-ignore regex applied to every table
    #[serde(default)]
    pub ignore_pattern: Option<String>,
    #[serde(default = "default_trigger_timeout")]
    pub trigger_timeout: String,
    #[serde(default)]
    pub dispose: DisposalPolicy,
    /// Apply fixes proposed by pre-flight checks
    #[serde(default)]
    pub accept_fixes: bool,
    /// Retries of idempotent lookups on transient errors
    #[serde(default = "default_statement_retries")]
    pub statement_retries: u32,
    /// Downgrade key collation mismatches from failure to warning
    #[serde(default)]
    pub allow_key_collation_mismatch: bool,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl LoadMetadata {
    /// Read a recipe, choosing the format from the file extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoadError::config(format!("cannot read recipe {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Parse a YAML recipe.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| LoadError::config(format!("invalid recipe: {e}")))
    }

    /// Parse a TOML recipe.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LoadError::config(format!("invalid recipe: {e}")))
    }

    /// Server holding RAW and STAGING.
    pub fn staging_connection(&self) -> &ConnectionConfig {
        self.staging_server.as_ref().unwrap_or(&self.live)
    }

    /// Parsed trigger creation timeout.
    pub fn trigger_timeout(&self) -> Result<Duration> {
        parse_timeout(&self.trigger_timeout)
            .map_err(|e| LoadError::config(format!("trigger_timeout: {e:#}")))
    }

    /// Distinct LIVE databases, in recipe order.
    pub fn root_databases(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tables
            .iter()
            .filter(|t| seen.insert(t.database.to_lowercase()))
            .map(|t| t.database.clone())
            .collect()
    }

    /// Find a table by its LIVE name.
    pub fn find_table(&self, table: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.table.eq_ignore_ascii_case(table))
    }

    /// The combined global and per-table diff-ignore regex.
    pub fn ignore_regex(&self, table: &TableConfig) -> Result<Option<Regex>> {
        let pattern = match (&self.ignore_pattern, &table.ignore_pattern) {
            (Some(global), Some(local)) => format!("(?:{global})|(?:{local})"),
            (Some(pattern), None) | (None, Some(pattern)) => pattern.clone(),
            (None, None) => return Ok(None),
        };
        Regex::new(&pattern).map(Some).map_err(|e| {
            LoadError::config(format!("invalid ignore pattern for table {}: {e}", table.table))
        })
    }

    /// Check the recipe is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LoadError::config("recipe name is empty"));
        }
        if self.tables.is_empty() {
            return Err(LoadError::config("recipe lists no tables"));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.live_ref().to_string().to_lowercase()) {
                return Err(LoadError::config(format!(
                    "table {} is listed twice",
                    table.live_ref()
                )));
            }
            self.ignore_regex(table)?;
        }

        self.trigger_timeout()?;
        self.naming.namer(0)?;

        if self.naming.convention == NamingConvention::Fixed {
            let live: HashSet<String> =
                self.root_databases().iter().map(|d| d.to_lowercase()).collect();
            for name in [&self.naming.raw, &self.naming.staging].into_iter().flatten() {
                if live.contains(&name.to_lowercase()) {
                    return Err(LoadError::config(format!(
                        "RAW/STAGING database {name} is also a LIVE database"
                    )));
                }
            }
            if let (Some(raw), Some(staging)) = (&self.naming.raw, &self.naming.staging) {
                if raw.eq_ignore_ascii_case(staging) {
                    return Err(LoadError::config(format!(
                        "RAW and STAGING are both {raw}; they must be different databases"
                    )));
                }
            }
            // every root lands in the same RAW/STAGING database
            let mut located = HashSet::new();
            for table in &self.tables {
                let key = (
                    table.schema.as_deref().unwrap_or("").to_lowercase(),
                    table.table.to_lowercase(),
                );
                if !located.insert(key) {
                    return Err(LoadError::config(format!(
                        "table {} would share its RAW/STAGING copy with another table of the same name",
                        table.live_ref()
                    )));
                }
            }
        }

        for component in &self.components {
            match component {
                ComponentConfig::Csv(csv) => {
                    if self.find_table(&csv.table).is_none() {
                        return Err(LoadError::config(format!(
                            "csv component targets table {} which the recipe does not list",
                            csv.table
                        )));
                    }
                    if !csv.delimiter.is_ascii() {
                        return Err(LoadError::config(format!(
                            "csv delimiter '{}' is not a single-byte character",
                            csv.delimiter
                        )));
                    }
                    glob::Pattern::new(&csv.pattern).map_err(|e| {
                        LoadError::config(format!("invalid csv pattern '{}': {e}", csv.pattern))
                    })?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
name: Clinical
load_directory: /tmp/clinical
live:
  engine: mssql
  host: live-sql
  user: loader
  password: secret
staging_server:
  engine: mysql
  host: staging
  user: stager
  password_env: STAGED_LOAD_TEST_UNSET_PASSWORD
tables:
  - database: Clinical
    schema: dbo
    table: People
    ignore_pattern: "^FavouriteColour$"
    discarded_columns:
      - name: SourceFile
        type: text
        nullable: true
  - database: Clinical
    table: Visits
ignore_pattern: "^Scraped"
components:
  - type: csv
    table: people
"#;

    #[test]
    fn test_parse_yaml_recipe_with_defaults() {
        let recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.validate().unwrap();
        assert_eq!(recipe.live.engine, Engine::MicrosoftSqlServer);
        assert_eq!(recipe.live.port(), 1433);
        assert_eq!(recipe.staging_connection().engine, Engine::MySql);
        assert_eq!(recipe.trigger_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(recipe.statement_retries, 3);
        assert_eq!(recipe.dispose, DisposalPolicy::default());
        assert_eq!(recipe.root_databases(), vec!["Clinical".to_string()]);
        assert_eq!(recipe.tables[0].discarded_columns[0].name, "SourceFile");

        let ComponentConfig::Csv(csv) = &recipe.components[0];
        assert_eq!(csv.pattern, "*.csv");
        assert_eq!(csv.delimiter, ',');
        assert!(csv.has_headers);
    }

    #[test]
    fn test_ignore_patterns_combine() {
        let recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        let people = recipe.ignore_regex(&recipe.tables[0]).unwrap().unwrap();
        assert!(people.is_match("FavouriteColour"));
        assert!(people.is_match("ScrapedAt"));
        assert!(!people.is_match("Postcode"));

        let visits = recipe.ignore_regex(&recipe.tables[1]).unwrap().unwrap();
        assert!(!visits.is_match("FavouriteColour"));
    }

    #[test]
    fn test_password_env_missing_is_credentials_error() {
        let recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        assert_eq!(recipe.live.resolve_password().unwrap().as_deref(), Some("secret"));
        let err = recipe.staging_connection().resolve_password().unwrap_err();
        assert!(matches!(err, LoadError::MissingCredentials(_)));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_validation_failures() {
        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.tables.push(recipe.tables[0].clone());
        assert!(recipe.validate().unwrap_err().to_string().contains("listed twice"));

        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.naming.convention = NamingConvention::Fixed;
        assert!(recipe.validate().is_err());
        recipe.naming.raw = Some("Clinical".to_string());
        recipe.naming.staging = Some("Scratch_STAGING".to_string());
        assert!(recipe.validate().unwrap_err().to_string().contains("also a LIVE database"));

        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.trigger_timeout = "0s".to_string();
        assert!(recipe.validate().is_err());

        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.tables[0].ignore_pattern = Some("(".to_string());
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_fixed_naming_needs_distinct_raw_and_staging() {
        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.naming.convention = NamingConvention::Fixed;
        recipe.naming.raw = Some("LoadArea".to_string());
        recipe.naming.staging = Some("loadarea".to_string());
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("must be different databases"), "{err}");

        recipe.naming.staging = Some("LoadStaging".to_string());
        recipe.validate().unwrap();
    }

    #[test]
    fn test_fixed_naming_rejects_same_table_in_two_roots() {
        let mut recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        recipe.naming.convention = NamingConvention::Fixed;
        recipe.naming.raw = Some("LoadArea".to_string());
        recipe.naming.staging = Some("LoadStaging".to_string());
        let mut research = recipe.tables[0].clone();
        research.database = "Research".to_string();
        recipe.tables.push(research.clone());
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("Research.dbo.People"), "{err}");
        assert!(err.contains("share its RAW/STAGING copy"), "{err}");

        // suffix naming gives each root its own bubbles
        recipe.naming.convention = NamingConvention::Suffix;
        recipe.validate().unwrap();
    }

    #[test]
    fn test_server_ignores_login() {
        let recipe = LoadMetadata::from_yaml_str(RECIPE).unwrap();
        assert_eq!(recipe.live.server(), "mssql://live-sql:1433");
        assert_eq!(recipe.staging_connection().server(), "mysql://staging:3306");
    }

    #[test]
    fn test_parse_toml_recipe() {
        let recipe = LoadMetadata::from_toml_str(
            r#"
name = "Clinical"
load_directory = "/tmp/clinical"
trigger_timeout = "2m"

[live]
engine = "postgresql"
host = "localhost"
database = "postgres"

[naming]
convention = "job_scoped"

[[tables]]
database = "clinical"
table = "people"
"#,
        )
        .unwrap();
        recipe.validate().unwrap();
        assert_eq!(recipe.trigger_timeout().unwrap(), Duration::from_secs(120));
        assert_eq!(recipe.naming.convention, NamingConvention::JobScoped);
        assert_eq!(recipe.live.describe(), "postgresql://localhost:5432/postgres");
    }
}
