//! Expression types for plan nodes.
//!
//! The transformer never parses SQL; it consumes expressions produced by the
//! upstream logical planner in this representation.

mod ast;

pub use ast::*;
