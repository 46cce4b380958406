//! Catalog lookup used by the transformer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use super::error::CatalogError;
use super::schema::{TableDef, TableHandle};

/// Table lookup by database and name.
pub trait Catalog: Send + Sync {
    fn get_table(&self, db: &str, name: &str) -> Option<Arc<dyn TableHandle>>;
}

/// In-memory catalog keyed by database, then table name.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    databases: RwLock<BTreeMap<String, BTreeMap<String, Arc<TableDef>>>>,
}

/// JSON catalog file: `{"databases": {"db": [table, ...]}}`.
#[derive(Deserialize)]
struct CatalogFile {
    databases: BTreeMap<String, Vec<TableDef>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, failing if the name is taken in `db`.
    pub fn add_table(&self, db: &str, table: TableDef) -> Result<(), CatalogError> {
        let mut databases = self.databases.write();
        let tables = databases.entry(db.to_string()).or_default();
        let name = table.name().to_string();
        if tables.contains_key(&name) {
            return Err(CatalogError::TableExists {
                db: db.to_string(),
                table: name,
            });
        }
        tables.insert(name, Arc::new(table));
        Ok(())
    }

    /// Table names of `db` in sorted order.
    pub fn table_names(&self, db: &str) -> Vec<String> {
        self.databases
            .read()
            .get(db)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let catalog = Self::new();
        for (db, tables) in file.databases {
            for table in tables {
                catalog.add_table(&db, table)?;
            }
        }
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

impl Catalog for MemoryCatalog {
    fn get_table(&self, db: &str, name: &str) -> Option<Arc<dyn TableHandle>> {
        let databases = self.databases.read();
        let table = databases.get(db)?.get(name)?;
        Some(table.clone() as Arc<dyn TableHandle>)
    }
}
