//! Delimited flat files into one RAW table.

use super::LoadComponent;
use crate::checks::{CheckEvent, CheckNotifier};
use crate::config::CsvComponentConfig;
use crate::database::Database;
use crate::error::{LoadError, Result};
use crate::job::{JobContext, TablePlan};
use async_trait::async_trait;
use load_core::{Cell, ColumnDefinition, UniversalValue};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Loads every file in `ForLoading` matching a glob pattern into one RAW table.
pub struct CsvAttacher {
    config: CsvComponentConfig,
    consumed: Mutex<Vec<PathBuf>>,
}

impl CsvAttacher {
    pub fn new(config: CsvComponentConfig) -> Self {
        Self {
            config,
            consumed: Mutex::new(Vec::new()),
        }
    }

    fn error(&self, message: impl Into<String>) -> LoadError {
        LoadError::Component {
            component: self.name(),
            message: message.into(),
        }
    }

    /// Matching files, in name order so loads are repeatable.
    fn files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = glob::Pattern::new(&self.config.pattern)
            .map_err(|e| self.error(format!("invalid pattern '{}': {e}", self.config.pattern)))?;
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.matches(n));
            if path.is_file() && matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn reader(&self, path: &Path) -> Result<::csv::Reader<File>> {
        ::csv::ReaderBuilder::new()
            .has_headers(self.config.has_headers)
            .delimiter(self.config.delimiter as u8)
            .from_path(path)
            .map_err(|e| self.error(format!("cannot open {}: {e}", path.display())))
    }

    fn target<'c>(&self, ctx: &'c JobContext) -> Result<&'c TablePlan> {
        ctx.table(&self.config.table)
            .ok_or_else(|| self.error(format!("table {} is not part of this load", self.config.table)))
    }

    /// RAW column for each file column. Without a header row the file is read in RAW
    /// column order.
    fn file_columns(
        &self,
        reader: &mut ::csv::Reader<File>,
        path: &Path,
        plan: &TablePlan,
    ) -> Result<Vec<ColumnDefinition>> {
        let raw_columns: Vec<&ColumnDefinition> = plan
            .raw_def
            .columns
            .iter()
            .chain(&plan.raw_def.discarded_columns)
            .collect();
        if !self.config.has_headers {
            return Ok(raw_columns.into_iter().cloned().collect());
        }
        let headers = reader
            .headers()
            .map_err(|e| self.error(format!("cannot read headers of {}: {e}", path.display())))?;
        headers
            .iter()
            .map(|header| {
                raw_columns
                    .iter()
                    .find(|c| c.is_named(header.trim()))
                    .map(|c| (*c).clone())
                    .ok_or_else(|| {
                        self.error(format!(
                            "{} has column '{}' which {} does not have",
                            path.display(),
                            header,
                            plan.raw
                        ))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl LoadComponent for CsvAttacher {
    fn name(&self) -> String {
        format!("csv:{}", self.config.table)
    }

    fn check(&self, ctx: &JobContext, notifier: &dyn CheckNotifier) -> bool {
        let plan = match self.target(ctx) {
            Ok(plan) => plan,
            Err(e) => {
                notifier.on_check(CheckEvent::fail(e.to_string()));
                return false;
            }
        };
        let files = match self.files(&ctx.directory.for_loading()) {
            Ok(files) => files,
            Err(e) => {
                notifier.on_check(CheckEvent::fail(e.to_string()));
                return false;
            }
        };
        let mut ok = true;
        for path in &files {
            let outcome = self
                .reader(path)
                .and_then(|mut reader| self.file_columns(&mut reader, path, plan));
            if let Err(e) = outcome {
                notifier.on_check(CheckEvent::fail(e.to_string()));
                ok = false;
            }
        }
        if ok {
            notifier.on_check(CheckEvent::success(format!(
                "{}: {} file(s) waiting for {}",
                self.name(),
                files.len(),
                plan.raw
            )));
        }
        ok
    }

    fn has_new_data(&self, ctx: &JobContext) -> Result<bool> {
        Ok(!self.files(&ctx.directory.for_loading())?.is_empty())
    }

    async fn populate_raw(&self, raw: &dyn Database, ctx: &JobContext) -> Result<u64> {
        let plan = self.target(ctx)?;
        let files = self.files(&ctx.directory.for_loading())?;
        let mut written = 0;
        for path in &files {
            ctx.check_stop()?;
            let mut reader = self.reader(path)?;
            let columns = self.file_columns(&mut reader, path, plan)?;
            let mut rows = 0;
            for (index, record) in reader.records().enumerate() {
                let line = index + if self.config.has_headers { 2 } else { 1 };
                let record = record
                    .map_err(|e| self.error(format!("{}:{line}: {e}", path.display())))?;
                if record.len() != columns.len() {
                    return Err(self.error(format!(
                        "{}:{line}: expected {} fields, found {}",
                        path.display(),
                        columns.len(),
                        record.len()
                    )));
                }
                let cells = columns
                    .iter()
                    .zip(record.iter())
                    .map(|(column, field)| {
                        UniversalValue::parse_as(field, &column.column_type)
                            .map(|value| Cell::new(column.name.clone(), column.column_type.clone(), value))
                            .map_err(|e| {
                                self.error(format!("{}:{line}: column {}: {e}", path.display(), column.name))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                raw.insert_row(&plan.raw, &cells, false).await?;
                rows += 1;
            }
            debug!("Loaded {rows} rows from {}", path.display());
            written += rows;
            self.consumed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.clone());
        }
        info!("{} wrote {written} rows into {}", self.name(), plan.raw);
        Ok(written)
    }

    fn consumed_files(&self) -> Vec<PathBuf> {
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
