//! Planning errors.

use thiserror::Error;

use crate::codegen::CodegenError;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Coarse error category reported alongside every [`PlanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed or unsupported logical plan, unresolved table or column.
    Plan,
    /// Expression compilation failed.
    Codegen,
    /// Function definition compilation failed.
    OpGen,
}

/// Query planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("table not found: {db}.{table}")]
    TableNotFound { db: String, table: String },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("fail to handle window: {0}")]
    Window(String),

    #[error("logical plan exceeds max depth {0}")]
    TooDeep(usize),

    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("fail to codegen function: {0}")]
    OpGen(String),
}

impl PlanError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PlanError::Codegen(_) => ErrorCode::Codegen,
            PlanError::OpGen(_) => ErrorCode::OpGen,
            _ => ErrorCode::Plan,
        }
    }
}
