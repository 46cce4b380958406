//! Index selection for grouping, partitioning and window ordering.

use tracing::debug;

use super::PhysicalPass;
use crate::planner::index::{transform_group_expr, transform_order_expr, GroupRewrite};
use crate::planner::ops::{DataProvider, Group, ProjectType, ProviderType, Sort};
use crate::planner::physical::{NodeId, NodeManager, PhysicalOp};
use crate::sql::Expr;

/// Replaces table scans feeding grouped operators with index partition scans.
///
/// Group keys covered by the chosen index are removed from the operator; a
/// `GROUP BY` left with no keys is dropped. A window whose first order key
/// is the index's time column loses that key.
pub struct GroupAndSortOptimized;

impl PhysicalPass for GroupAndSortOptimized {
    fn name(&self) -> &str {
        "GroupAndSortOptimized"
    }

    fn transform(&self, nodes: &mut NodeManager, node: NodeId) -> Option<NodeId> {
        let current = nodes.get(node);
        let producers = current.producers().to_vec();
        match current.op().clone() {
            PhysicalOp::GroupBy(group) => {
                let (provider, rewrite) = group_optimized(nodes, *producers.first()?, &group.groups)?;
                if rewrite.residual.is_empty() {
                    debug!(index = %rewrite.index_name, "group by fully covered by index");
                    return Some(provider);
                }
                let op = PhysicalOp::GroupBy(Group::new(rewrite.residual));
                Some(nodes.derive(node, op, vec![provider]))
            }
            PhysicalOp::Project(mut project)
                if project.project_type == ProjectType::WindowAggregation =>
            {
                let window = project.window.as_mut()?;
                let (provider, rewrite) =
                    group_optimized(nodes, *producers.first()?, &window.group.groups)?;
                window.group = Group::new(rewrite.residual);
                sort_optimized(nodes, provider, &mut window.sort);
                Some(nodes.derive(node, PhysicalOp::Project(project), vec![provider]))
            }
            PhysicalOp::RequestUnion(mut window) => {
                let (provider, rewrite) =
                    group_optimized(nodes, *producers.get(1)?, &window.group.groups)?;
                window.group = Group::new(rewrite.residual);
                window.hash.keys = rewrite.keys;
                sort_optimized(nodes, provider, &mut window.sort);
                let op = PhysicalOp::RequestUnion(window);
                Some(nodes.derive(node, op, vec![producers[0], provider]))
            }
            PhysicalOp::Join(mut join) | PhysicalOp::RequestJoin(mut join) => {
                let (provider, rewrite) =
                    group_optimized(nodes, *producers.get(1)?, &join.right_partition.groups)?;
                join.right_partition = Group::new(rewrite.residual);
                let op = match nodes.get(node).op() {
                    PhysicalOp::RequestJoin(_) => PhysicalOp::RequestJoin(join),
                    _ => PhysicalOp::Join(join),
                };
                Some(nodes.derive(node, op, vec![producers[0], provider]))
            }
            _ => None,
        }
    }
}

/// Swap a table scan for a partition scan over the index best matching
/// `groups`.
fn group_optimized(
    nodes: &mut NodeManager,
    producer: NodeId,
    groups: &[Expr],
) -> Option<(NodeId, GroupRewrite)> {
    let source = nodes.get(producer);
    if !source.is_table_provider() {
        return None;
    }
    let table = source.op().as_provider()?.table.clone();
    let rewrite = transform_group_expr(groups, table.index_hint())?;

    let provider = DataProvider::partition(table, rewrite.index_name.clone(), rewrite.keys.clone());
    let id = nodes.make(PhysicalOp::DataProvider(provider), vec![]);
    Some((id, rewrite))
}

/// Drop the leading order key when the partition's index is sorted by it.
fn sort_optimized(nodes: &NodeManager, provider: NodeId, sort: &mut Sort) -> bool {
    let Some(source) = nodes.get(provider).op().as_provider() else {
        return false;
    };
    let ProviderType::Partition { index_name, .. } = &source.provider_type else {
        return false;
    };
    let Some(ts_column) = source
        .table
        .index_hint()
        .get(index_name)
        .and_then(|index| index.ts_column.as_deref())
    else {
        return false;
    };
    let Some(orders) = sort.orders.as_ref() else {
        return false;
    };

    match transform_order_expr(orders, ts_column) {
        Some(rest) => {
            *sort = Sort::new(Some(rest));
            true
        }
        None => false,
    }
}
