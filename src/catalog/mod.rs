//! Catalog access for the plan transformer.
//!
//! The transformer only needs to look tables up by database and name and read
//! their row schema and index hints. [`MemoryCatalog`] is a self-contained
//! implementation that can be loaded from a JSON description.

mod error;
mod manager;
mod schema;
mod types;

pub use error::CatalogError;
pub use manager::{Catalog, MemoryCatalog};
pub use schema::{IndexHint, IndexSt, TableBuilder, TableDef, TableHandle};
pub use types::{flatten_schemas, ColumnDef, DataType, NamedSchema, Schema};
