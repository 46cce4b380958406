//! Column resolution against an operator's input schemas.

use crate::catalog::{DataType, NamedSchema};
use crate::sql::{ColumnRef, Expr};

/// Where the columns of an expression (or expression list) come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprSource {
    /// No column references at all.
    Constant,
    /// Every column resolves to the input schema at this index.
    Input(usize),
    /// A column is missing or ambiguous, or columns span several inputs.
    Unresolved,
}

/// Resolves column references against an ordered name-schema list.
#[derive(Debug, Clone, Copy)]
pub struct SchemasContext<'a> {
    schemas: &'a [NamedSchema],
}

impl<'a> SchemasContext<'a> {
    pub fn new(schemas: &'a [NamedSchema]) -> Self {
        Self { schemas }
    }

    /// Index of the single input schema owning `col`.
    ///
    /// A qualified reference only matches schemas of that relation. Returns
    /// `None` when the column is missing or matches more than one input.
    pub fn resolve_column(&self, col: &ColumnRef) -> Option<usize> {
        let mut found = None;
        for (idx, named) in self.schemas.iter().enumerate() {
            if let Some(relation) = col.relation.as_deref() {
                if !relation.is_empty() && relation != named.relation {
                    continue;
                }
            }
            if named.schema.contains(&col.column) {
                if found.is_some() {
                    return None;
                }
                found = Some(idx);
            }
        }
        found
    }

    pub fn column_type(&self, col: &ColumnRef) -> Option<DataType> {
        let idx = self.resolve_column(col)?;
        self.schemas[idx]
            .schema
            .get_column(&col.column)
            .map(|c| c.data_type)
    }

    pub fn resolve_expr(&self, expr: &Expr) -> ExprSource {
        self.resolve_refs(expr.column_refs())
    }

    pub fn resolve_exprs(&self, exprs: &[Expr]) -> ExprSource {
        self.resolve_refs(exprs.iter().flat_map(|e| e.column_refs()).collect())
    }

    fn resolve_refs(&self, refs: Vec<&ColumnRef>) -> ExprSource {
        let mut source = ExprSource::Constant;
        for col in refs {
            let Some(idx) = self.resolve_column(col) else {
                return ExprSource::Unresolved;
            };
            match source {
                ExprSource::Constant => source = ExprSource::Input(idx),
                ExprSource::Input(prev) if prev == idx => {}
                _ => return ExprSource::Unresolved,
            }
        }
        source
    }
}
