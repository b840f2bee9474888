//! Test infrastructure.
//!
//! [`MemoryDatabase`] implements the database seam in memory, archive triggers
//! included, so whole loads can run without a server. The helpers here build the
//! `Clinical.dbo.People` table and recipe used across the unit and integration tests.

mod memory;

pub use memory::{MemoryDatabase, MemoryOp};

use crate::config::LoadMetadata;
use crate::database::Database;
use crate::error::Result;
use load_core::{
    Cell, ColumnDefinition, TableDefinition, TableRef, UniversalType, UniversalValue,
    DATA_LOAD_RUN_ID, VALID_FROM,
};
use std::path::{Path, PathBuf};

/// LIVE `People`: keyed on (Name, Age), with both audit columns.
pub fn people_definition() -> TableDefinition {
    TableDefinition::new(
        "People",
        vec![
            ColumnDefinition::new("Name", UniversalType::varchar(50)).key(),
            ColumnDefinition::new("Age", UniversalType::Int32).key(),
            ColumnDefinition::nullable("Postcode", UniversalType::varchar(10)),
            ColumnDefinition::nullable("FavouriteColour", UniversalType::varchar(20)),
            ColumnDefinition::nullable(DATA_LOAD_RUN_ID, UniversalType::Int32),
            ColumnDefinition::nullable(VALID_FROM, UniversalType::LocalDateTime),
        ],
    )
}

pub fn people_ref() -> TableRef {
    TableRef::new("Clinical", Some("dbo".to_string()), "People")
}

/// Create `Clinical.dbo.People` on `db` with `definition`.
pub async fn create_live_table(db: &dyn Database, definition: &TableDefinition) -> Result<TableRef> {
    let live = people_ref();
    if !db.database_exists(&live.database).await? {
        db.create_database(&live.database).await?;
    }
    db.create_table(&live, definition, true).await?;
    Ok(live)
}

/// Insert one person directly, as a pre-existing LIVE row would have been.
pub async fn put_person(
    db: &dyn Database,
    table: &TableRef,
    name: &str,
    age: i64,
    postcode: Option<&str>,
) -> Result<()> {
    let text = |s: Option<&str>| {
        s.map(|s| UniversalValue::Text(s.to_string()))
            .unwrap_or(UniversalValue::Null)
    };
    let cells = vec![
        Cell::new("Name", UniversalType::varchar(50), text(Some(name))),
        Cell::new("Age", UniversalType::Int32, UniversalValue::Int(age)),
        Cell::new("Postcode", UniversalType::varchar(10), text(postcode)),
    ];
    db.insert_row(table, &cells, false).await?;
    Ok(())
}

/// A recipe loading `People.csv` files into `Clinical.dbo.People` on SQL Server.
pub fn people_recipe(load_directory: &Path) -> Result<LoadMetadata> {
    let yaml = format!(
        r#"
name: People
load_directory: "{}"
live:
  engine: mssql
  host: memory
  user: loader
  password: memory
tables:
  - database: Clinical
    schema: dbo
    table: People
components:
  - type: csv
    table: People
"#,
        load_directory.display()
    );
    LoadMetadata::from_yaml_str(&yaml)
}

/// Drop a file into `Data/ForLoading`.
pub fn write_for_loading(load_directory: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let dir = load_directory.join("Data").join("ForLoading");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}
