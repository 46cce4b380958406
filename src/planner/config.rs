//! Transformer configuration.

use serde::{Deserialize, Serialize};

use super::optimizer::PassType;

/// Default bound on logical plan recursion depth.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// How the plan will be executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Whole tables are scanned.
    #[default]
    Batch,
    /// One request row of the primary table drives the plan.
    Request,
}

/// Transformer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Database the plan's tables are looked up in.
    pub db: String,
    pub mode: TransformMode,
    /// Optimization passes, applied in order.
    pub passes: Vec<PassType>,
    /// Deepest logical plan accepted before failing.
    pub max_depth: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            db: "default".to_string(),
            mode: TransformMode::Batch,
            passes: PassType::default_order().to_vec(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl TransformerConfig {
    /// Create a new configuration for the given database.
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the pass list.
    pub fn passes(mut self, passes: Vec<PassType>) -> Self {
        self.passes = passes;
        self
    }

    /// Disable all optimization passes.
    pub fn without_passes(mut self) -> Self {
        self.passes.clear();
        self
    }

    pub fn max_depth(mut self, value: usize) -> Self {
        self.max_depth = value;
        self
    }
}
