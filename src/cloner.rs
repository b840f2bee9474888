//! Table cloning into the RAW and STAGING bubbles.
//!
//! RAW clones are deliberately loose so malformed source rows still land for
//! inspection: every column nullable, no enforced primary key, no identity, no audit
//! columns, plus the recipe's pre-load discarded columns. STAGING clones mirror LIVE
//! exactly (key, nullability, key collation, audit columns) because STAGING is diffed
//! against LIVE. Collation names only carry over when both servers run the same engine.

use crate::database::Database;
use crate::error::Result;
use load_core::{
    archive_table_definition, is_audit_column, Bubble, BubbleNamer, ColumnDefinition, Engine,
    TableDefinition, TableRef,
};
use tracing::{debug, info};

/// Creates bubble copies of LIVE tables on one server.
pub struct TableCloner<'a> {
    db: &'a dyn Database,
    namer: &'a dyn BubbleNamer,
    keep_collations: bool,
}

impl<'a> TableCloner<'a> {
    /// Cloner for LIVE tables discovered on a server of the same engine as `db`.
    pub fn new(db: &'a dyn Database, namer: &'a dyn BubbleNamer) -> Self {
        Self {
            db,
            namer,
            keep_collations: true,
        }
    }

    /// LIVE runs on `engine`. Its collation names mean nothing to another engine, so
    /// clones then fall back to the target server's default.
    pub fn with_live_engine(mut self, engine: Engine) -> Self {
        self.keep_collations = engine == self.db.dialect().engine();
        self
    }

    fn collation(&self, column: &ColumnDefinition) -> Option<String> {
        if self.keep_collations {
            column.collation.clone()
        } else {
            None
        }
    }

    /// Where `live` lives in `bubble`.
    pub fn location(&self, live: &TableRef, bubble: Bubble) -> TableRef {
        TableRef::new(
            self.namer.database_name(&live.database, bubble),
            live.schema.clone(),
            self.namer.table_name(&live.table, bubble),
        )
    }

    /// Shape of `live_def` in `bubble`. The primary key flags are kept on RAW so the
    /// RAW to STAGING diff knows the row identity, even though RAW does not enforce it.
    pub fn clone_definition(
        &self,
        live_def: &TableDefinition,
        discarded: &[ColumnDefinition],
        bubble: Bubble,
    ) -> TableDefinition {
        let name = self.namer.table_name(&live_def.name, bubble);
        match bubble {
            Bubble::Raw => {
                let columns = live_def
                    .columns
                    .iter()
                    .filter(|c| !is_audit_column(&c.name))
                    .map(|c| ColumnDefinition {
                        nullable: true,
                        identity: false,
                        collation: self.collation(c),
                        ..c.clone()
                    })
                    .collect();
                let discarded = discarded
                    .iter()
                    .map(|c| ColumnDefinition {
                        nullable: true,
                        primary_key: false,
                        identity: false,
                        ..c.clone()
                    })
                    .collect();
                let mut definition = TableDefinition::new(name, columns);
                definition.discarded_columns = discarded;
                definition
            }
            Bubble::Staging => TableDefinition::new(
                name,
                live_def
                    .columns
                    .iter()
                    .map(|c| ColumnDefinition {
                        identity: false,
                        collation: self.collation(c),
                        ..c.clone()
                    })
                    .collect(),
            ),
            Bubble::Live => TableDefinition::new(name, live_def.columns.clone()),
            Bubble::Archive => archive_table_definition(name, live_def),
        }
    }

    /// Create the bubble database for `root` if it is missing. Returns its name.
    pub async fn ensure_database(&self, root: &str, bubble: Bubble) -> Result<String> {
        let name = self.namer.database_name(root, bubble);
        if !self.db.database_exists(&name).await? {
            info!("Creating {bubble} database {name} on {}", self.db.describe());
            self.db.create_database(&name).await?;
        }
        Ok(name)
    }

    /// Create the `bubble` copy of `live` unless it already exists. Returns where it is
    /// and the definition it was created with.
    pub async fn clone_table(
        &self,
        live: &TableRef,
        live_def: &TableDefinition,
        discarded: &[ColumnDefinition],
        bubble: Bubble,
    ) -> Result<(TableRef, TableDefinition)> {
        let location = self.location(live, bubble);
        let definition = self.clone_definition(live_def, discarded, bubble);
        if self.db.table_exists(&location).await? {
            debug!("{location} already exists, not cloning");
            return Ok((location, definition));
        }
        info!("Cloning {live} into {bubble} as {location}");
        self.db
            .create_table(&location, &definition, bubble == Bubble::Staging)
            .await?;
        Ok((location, definition))
    }

    /// Remove the `bubble` copies of `tables`. Reused locations keep their database
    /// and lose only the tables; job-owned databases are dropped whole.
    pub async fn dispose(&self, roots: &[String], tables: &[TableRef], bubble: Bubble) -> Result<()> {
        if self.namer.reuses_location(bubble) {
            for live in tables {
                let location = self.location(live, bubble);
                if self.db.table_exists(&location).await? {
                    info!("Dropping {location}");
                    self.db.drop_table(&location).await?;
                }
            }
            return Ok(());
        }
        for root in roots {
            let name = self.namer.database_name(root, bubble);
            if self.db.database_exists(&name).await? {
                info!("Dropping {bubble} database {name}");
                self.db.drop_database(&name).await?;
            }
        }
        Ok(())
    }

    /// Names of the `bubble` copies of `tables` that are present: tables where the
    /// location is reused, whole databases otherwise.
    pub async fn present(&self, roots: &[String], tables: &[TableRef], bubble: Bubble) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if self.namer.reuses_location(bubble) {
            for live in tables {
                let location = self.location(live, bubble);
                if self.db.table_exists(&location).await? {
                    found.push(location.to_string());
                }
            }
            return Ok(found);
        }
        for root in roots {
            let name = self.namer.database_name(root, bubble);
            if self.db.database_exists(&name).await? {
                found.push(name);
            }
        }
        Ok(found)
    }

    /// True when any `bubble` copy of `tables` is present.
    pub async fn any_present(&self, roots: &[String], tables: &[TableRef], bubble: Bubble) -> Result<bool> {
        Ok(!self.present(roots, tables, bubble).await?.is_empty())
    }
}
