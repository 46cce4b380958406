//! Code generation errors.

use thiserror::Error;

/// Expression compilation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("empty expression list")]
    EmptyExprList,

    #[error("unresolved column: {0}")]
    UnresolvedColumn(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid expression {expr}: {reason}")]
    InvalidExpr { expr: String, reason: String },

    #[error("invalid function {name}: {reason}")]
    InvalidFunction { name: String, reason: String },
}

impl CodegenError {
    pub(crate) fn invalid_expr(expr: impl ToString, reason: impl Into<String>) -> Self {
        CodegenError::InvalidExpr {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}
