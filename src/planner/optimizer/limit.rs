//! Limit pushdown.

use super::PhysicalPass;
use crate::planner::physical::{NodeId, NodeManager, PhysicalOp};

/// Pushes a `LIMIT` row cap down through non-blocking single-input operators.
///
/// The cap lands on the first blocking operator, multi-input operator or
/// scan below the limit, and only ever tightens an existing cap. The limit
/// node itself is kept and marked optimized.
pub struct LimitOptimized;

impl PhysicalPass for LimitOptimized {
    fn name(&self) -> &str {
        "LimitOptimized"
    }

    fn transform(&self, nodes: &mut NodeManager, node: NodeId) -> Option<NodeId> {
        let current = nodes.get(node);
        let PhysicalOp::Limit { optimized } = *current.op() else {
            return None;
        };
        let limit = current.limit_cnt()?;
        let child = current.producer(0)?;

        let new_child = apply_limit(nodes, child, limit);
        if optimized && new_child == child {
            return None;
        }
        Some(nodes.derive(node, PhysicalOp::Limit { optimized: true }, vec![new_child]))
    }
}

/// Cap `id` at `limit` rows, returning the (possibly copied) node.
fn apply_limit(nodes: &mut NodeManager, id: NodeId, limit: usize) -> NodeId {
    let current = nodes.get(id);
    let tighter = current.limit_cnt().map_or(true, |cnt| cnt > limit);

    if let PhysicalOp::Limit { optimized } = *current.op() {
        if !tighter {
            return id;
        }
        if !optimized {
            return nodes.with_limit(id, limit);
        }
        // An optimized limit already pushed its own cap; push the tighter one
        // through the same path.
        let Some(child) = current.producer(0) else {
            return nodes.with_limit(id, limit);
        };
        let new_child = apply_limit(nodes, child, limit);
        return if new_child == child {
            id
        } else {
            nodes.with_producers(id, vec![new_child])
        };
    }

    if current.is_block() || current.producers().len() != 1 {
        return if tighter { nodes.with_limit(id, limit) } else { id };
    }

    let child = current.producers()[0];
    let new_child = apply_limit(nodes, child, limit);
    if new_child == child {
        id
    } else {
        nodes.with_producers(id, vec![new_child])
    }
}
