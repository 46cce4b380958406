//! Logical to physical plan transformation.
//!
//! A [`LogicalPlan`] is lowered by the [`Transformer`] into a
//! [`PhysicalPlan`], rewritten by the [`optimizer`] passes and finally
//! annotated with compiled functions.

mod config;
mod error;
mod index;
mod logical;
mod ops;
pub mod optimizer;
mod physical;
mod predicate;
mod schemas;
mod transformer;

pub use config::{TransformMode, TransformerConfig, DEFAULT_MAX_DEPTH};
pub use error::{ErrorCode, PlanError, PlanResult};
pub use index::{match_best_index, transform_group_expr, transform_order_expr, GroupRewrite};
pub use logical::{JoinType, LogicalPlan, PlanId, PlanNode, ProjectItem, ProjectList};
pub use ops::{
    ConditionFilter, DataProvider, Group, Hash, Join, Project, ProjectType, ProviderType, Sort,
    WindowOp,
};
pub use optimizer::{PassType, PhysicalPass};
pub use physical::{NodeId, NodeManager, PhysicalNode, PhysicalOp, PhysicalPlan, SchemaType};
pub use predicate::{conjunction, split_conjunction, split_join_condition, EquiJoinSplit};
pub use schemas::{ExprSource, SchemasContext};
pub use transformer::Transformer;
