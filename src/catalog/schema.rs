//! Table definitions and index hints.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CatalogError;
use super::types::{ColumnDef, DataType, Schema};

/// A secondary index usable as a partition access path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSt {
    pub name: String,
    /// Ordered key columns.
    pub keys: Vec<String>,
    /// Column the index keeps rows ordered by within a partition.
    #[serde(default, rename = "ts", skip_serializing_if = "Option::is_none")]
    pub ts_column: Option<String>,
}

impl IndexSt {
    pub fn new(name: impl Into<String>, keys: &[&str], ts_column: Option<&str>) -> Self {
        Self {
            name: name.into(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            ts_column: ts_column.map(str::to_string),
        }
    }
}

/// Index name -> index definition, iterated in name order.
pub type IndexHint = BTreeMap<String, IndexSt>;

/// Read-only view of a catalog table.
pub trait TableHandle: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &Schema;

    fn index_hint(&self) -> &IndexHint;
}

/// Table definition held by [`MemoryCatalog`](super::MemoryCatalog).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableDefRepr", into = "TableDefRepr")]
pub struct TableDef {
    name: String,
    schema: Schema,
    indexes: IndexHint,
}

impl TableDef {
    /// Validate and assemble a table definition.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        indexes: Vec<IndexSt>,
    ) -> Result<Self, CatalogError> {
        let name = name.into();
        let mut seen = std::collections::HashSet::new();
        for col in schema.columns() {
            if !seen.insert(col.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
        }

        let mut hint = IndexHint::new();
        for index in indexes {
            if index.keys.is_empty() {
                return Err(CatalogError::InvalidIndex {
                    index: index.name,
                    reason: "index has no key columns".into(),
                });
            }
            let referenced = index.keys.iter().chain(index.ts_column.iter());
            for column in referenced {
                if !schema.contains(column) {
                    return Err(CatalogError::InvalidIndex {
                        index: index.name.clone(),
                        reason: format!("column {} not in table {}", column, name),
                    });
                }
            }
            if hint.contains_key(&index.name) {
                return Err(CatalogError::InvalidIndex {
                    index: index.name,
                    reason: "duplicate index name".into(),
                });
            }
            hint.insert(index.name.clone(), index);
        }

        Ok(Self {
            name,
            schema,
            indexes: hint,
        })
    }

    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }
}

impl TableHandle for TableDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn index_hint(&self) -> &IndexHint {
        &self.indexes
    }
}

/// On-disk shape of a table definition.
#[derive(Serialize, Deserialize)]
struct TableDefRepr {
    name: String,
    columns: Schema,
    #[serde(default)]
    indexes: Vec<IndexSt>,
}

impl TryFrom<TableDefRepr> for TableDef {
    type Error = CatalogError;

    fn try_from(repr: TableDefRepr) -> Result<Self, Self::Error> {
        TableDef::new(repr.name, repr.columns, repr.indexes)
    }
}

impl From<TableDef> for TableDefRepr {
    fn from(def: TableDef) -> Self {
        Self {
            name: def.name,
            columns: def.schema,
            indexes: def.indexes.into_values().collect(),
        }
    }
}

/// Builder for table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexSt>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a simple column with just name and type.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(ColumnDef::new(name, data_type));
        self
    }

    /// Add an index over `keys`, optionally ordered by `ts`.
    pub fn add_index(mut self, name: impl Into<String>, keys: &[&str], ts: Option<&str>) -> Self {
        self.indexes.push(IndexSt::new(name, keys, ts));
        self
    }

    pub fn build(self) -> Result<TableDef, CatalogError> {
        TableDef::new(self.name, Schema::new(self.columns), self.indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_table_with_index() {
        let table = TableDef::builder("t1")
            .add_column("col1", DataType::Int32)
            .add_column("col2", DataType::String)
            .add_column("ts", DataType::Timestamp)
            .add_index("index2", &["col2"], Some("ts"))
            .add_index("index1", &["col1", "col2"], None)
            .build()
            .unwrap();

        let names: Vec<&String> = table.index_hint().keys().collect();
        assert_eq!(names, vec!["index1", "index2"]);
        assert_eq!(
            table.index_hint()["index2"].ts_column.as_deref(),
            Some("ts")
        );
    }

    #[test]
    fn test_index_on_missing_column() {
        let result = TableDef::builder("t1")
            .add_column("col1", DataType::Int32)
            .add_index("bad", &["col9"], None)
            .build();
        assert!(matches!(result, Err(CatalogError::InvalidIndex { .. })));
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableDef::builder("t1")
            .add_column("a", DataType::Int32)
            .add_column("a", DataType::Int64)
            .build();
        assert!(matches!(result, Err(CatalogError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_table_from_json() {
        let json = r#"{
            "name": "t1",
            "columns": [{"name": "a", "type": "int32"}, {"name": "ts", "type": "timestamp"}],
            "indexes": [{"name": "idx_a", "keys": ["a"], "ts": "ts"}]
        }"#;
        let table: TableDef = serde_json::from_str(json).unwrap();
        assert_eq!(table.name(), "t1");
        assert_eq!(table.schema().len(), 2);
        assert_eq!(table.index_hint()["idx_a"].keys, vec!["a".to_string()]);

        let bad = r#"{"name": "t1", "columns": [], "indexes": [{"name": "i", "keys": ["x"]}]}"#;
        assert!(serde_json::from_str::<TableDef>(bad).is_err());
    }
}
