//! Planwright - logical to physical SQL plan transformation
//!
//! This crate turns a logical query plan into a physical operator tree for
//! either batch execution or per-request online execution, applies
//! rule-based rewrites (equi-join key extraction, index selection for
//! grouping and windows, left-join reordering, limit pushdown) and attaches
//! compiled functions to every operator that evaluates expressions.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use planwright::catalog::{DataType, MemoryCatalog, TableDef};
//! use planwright::codegen::SchemaCodeGenerator;
//! use planwright::planner::{LogicalPlan, ProjectList, Transformer, TransformerConfig};
//! use planwright::sql::Expr;
//!
//! let catalog = MemoryCatalog::new();
//! let t1 = TableDef::builder("t1")
//!     .add_column("col1", DataType::Int32)
//!     .add_column("col2", DataType::String)
//!     .build()
//!     .unwrap();
//! catalog.add_table("db", t1).unwrap();
//!
//! let mut plan = LogicalPlan::new();
//! let scan = plan.table("t1");
//! let filter = plan.filter(scan, Expr::column("col1").gt(Expr::int(3)));
//! let project = plan.project(filter, ProjectList::new().push("col2", Expr::column("col2")));
//! let limit = plan.limit(project, 10);
//! let query = plan.query(limit);
//!
//! let transformer = Transformer::new(
//!     TransformerConfig::new("db"),
//!     Arc::new(catalog),
//!     Box::new(SchemaCodeGenerator::new()),
//! );
//! let physical = transformer.compile(&plan, &[query]).unwrap();
//! assert_eq!(physical.output_schema().column_names(), vec!["col2"]);
//! ```

pub mod catalog;
pub mod codegen;
pub mod planner;
pub mod sql;
