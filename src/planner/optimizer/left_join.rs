//! Grouping and sorting below left joins.

use tracing::debug;

use super::PhysicalPass;
use crate::catalog::NamedSchema;
use crate::planner::ops::ProjectType;
use crate::planner::physical::{NodeId, NodeManager, PhysicalOp};
use crate::planner::schemas::{ExprSource, SchemasContext};
use crate::sql::Expr;

/// Moves a `GROUP BY` or `ORDER BY` over a left or last join onto the join's
/// left input when every key is a left-side column.
///
/// Window aggregations over such joins are checked but left in place.
pub struct LeftJoinOptimized;

impl PhysicalPass for LeftJoinOptimized {
    fn name(&self) -> &str {
        "LeftJoinOptimized"
    }

    fn transform(&self, nodes: &mut NodeManager, node: NodeId) -> Option<NodeId> {
        let current = nodes.get(node);
        let join_id = current.producer(0)?;
        let join_node = nodes.get(join_id);
        let PhysicalOp::Join(join) = join_node.op() else {
            return None;
        };
        if !join.is_left_or_last() {
            return None;
        }
        let join = join.clone();
        let left = join_node.producer(0)?;
        let right = join_node.producer(1)?;
        let left_schemas = nodes.get(left).output_schemas();

        let pushed = match current.op() {
            PhysicalOp::GroupBy(group) => {
                if group.groups.is_empty() {
                    debug!("skip left join optimization: group keys are empty");
                    return None;
                }
                if !columns_from(&group.groups, left_schemas) {
                    return None;
                }
                current.op().clone()
            }
            PhysicalOp::SortBy(sort) => {
                if sort.exprs().is_empty() {
                    debug!("skip left join optimization: order keys are empty");
                    return None;
                }
                if !columns_from(sort.exprs(), left_schemas) {
                    return None;
                }
                current.op().clone()
            }
            PhysicalOp::Project(project)
                if project.project_type == ProjectType::WindowAggregation =>
            {
                let window = project.window.as_ref()?;
                if window.group.groups.is_empty() && window.sort.exprs().is_empty() {
                    return None;
                }
                let from_left = columns_from(&window.group.groups, left_schemas)
                    && columns_from(window.sort.exprs(), left_schemas);
                debug!(from_left, "window aggregation over left join is not rewritten");
                return None;
            }
            _ => return None,
        };

        let new_left = nodes.make(pushed, vec![left]);
        Some(nodes.make(PhysicalOp::Join(join), vec![new_left, right]))
    }
}

/// Every expression is a plain column resolving against `schemas`.
fn columns_from(exprs: &[Expr], schemas: &[NamedSchema]) -> bool {
    let ctx = SchemasContext::new(schemas);
    exprs.iter().all(|expr| {
        expr.as_column().is_some()
            && matches!(ctx.resolve_expr(expr), ExprSource::Input(_))
    })
}
