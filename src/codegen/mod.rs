//! Expression compilation interface.
//!
//! The transformer hands every expression list it attaches to a physical
//! operator to a [`CodeGenerator`] and stores the returned [`FnInfo`].
//! [`SchemaCodeGenerator`] validates expressions and infers output schemas
//! without emitting machine code.

mod error;
mod generator;

pub use error::CodegenError;
pub use generator::SchemaCodeGenerator;

use crate::catalog::{NamedSchema, Schema};
use crate::sql::{Expr, FnDef};

/// Compiled function handle plus the schema of the row it produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FnInfo {
    pub fn_name: String,
    pub fn_schema: Schema,
}

impl FnInfo {
    pub fn new(fn_name: impl Into<String>, fn_schema: Schema) -> Self {
        Self {
            fn_name: fn_name.into(),
            fn_schema,
        }
    }

    /// No function has been generated yet.
    pub fn is_empty(&self) -> bool {
        self.fn_name.is_empty()
    }
}

/// Compiles expression lists into callable row functions.
pub trait CodeGenerator {
    /// Compile `exprs` (output name, expression) against `inputs`.
    ///
    /// `row_mode` is set for functions evaluated once per input row, and
    /// cleared for aggregations over a group or window.
    fn compile(
        &mut self,
        inputs: &[NamedSchema],
        exprs: &[(String, Expr)],
        row_mode: bool,
    ) -> Result<FnInfo, CodegenError>;

    /// Compile and register a user-defined function.
    fn compile_function(&mut self, def: &FnDef) -> Result<(), CodegenError>;
}
