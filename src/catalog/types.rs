//! Column types and row schemas.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column data types known to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Timestamp,
    Date,
}

impl DataType {
    /// Get the SQL name for this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int16 => "SMALLINT",
            DataType::Int32 => "INT",
            DataType::Int64 => "BIGINT",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Date => "DATE",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Float | DataType::Double
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// A typed, named column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)
    }
}

/// Ordered list of columns produced by a table or an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get a column definition by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn push(&mut self, column: ColumnDef) {
        self.columns.push(column);
    }
}

impl FromIterator<ColumnDef> for Schema {
    fn from_iter<I: IntoIterator<Item = ColumnDef>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", cols.join(", "))
    }
}

/// A schema tagged with the relation name that produces it.
///
/// Operators expose a list of these so column references qualified by a
/// table name can be resolved to one specific input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSchema {
    pub relation: String,
    pub schema: Schema,
}

impl NamedSchema {
    pub fn new(relation: impl Into<String>, schema: Schema) -> Self {
        Self {
            relation: relation.into(),
            schema,
        }
    }
}

/// Concatenate a name-schema list into a single row schema.
pub fn flatten_schemas(schemas: &[NamedSchema]) -> Schema {
    schemas
        .iter()
        .flat_map(|s| s.schema.columns().iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![
            ColumnDef::new("id", DataType::Int64),
            ColumnDef::new("name", DataType::String),
        ]);
        assert_eq!(schema.len(), 2);
        assert!(schema.contains("name"));
        assert_eq!(schema.get_column("id").unwrap().data_type, DataType::Int64);
        assert!(schema.get_column("missing").is_none());
        assert_eq!(schema.to_string(), "[id BIGINT, name STRING]");
    }

    #[test]
    fn test_flatten_schemas() {
        let left = NamedSchema::new(
            "t1",
            Schema::new(vec![ColumnDef::new("a", DataType::Int32)]),
        );
        let right = NamedSchema::new(
            "t2",
            Schema::new(vec![
                ColumnDef::new("b", DataType::Double),
                ColumnDef::new("c", DataType::Bool),
            ]),
        );
        let flat = flatten_schemas(&[left, right]);
        assert_eq!(flat.column_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_column_type_json() {
        let col: ColumnDef = serde_json::from_str(r#"{"name":"ts","type":"timestamp"}"#).unwrap();
        assert_eq!(col, ColumnDef::new("ts", DataType::Timestamp));
    }
}
