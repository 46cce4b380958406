//! Catalog errors.

use thiserror::Error;

/// Errors raised while building or loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("invalid index {index}: {reason}")]
    InvalidIndex { index: String, reason: String },

    #[error("table already exists: {db}.{table}")]
    TableExists { db: String, table: String },

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
