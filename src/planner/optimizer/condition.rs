//! Equi-join key extraction.

use super::PhysicalPass;
use crate::planner::ops::{ConditionFilter, Join};
use crate::planner::physical::{NodeId, NodeManager, PhysicalOp};
use crate::planner::predicate::split_join_condition;

/// Moves `left = right` conjuncts of a join condition into the join's hash
/// and partition keys, leaving the rest as the join filter.
pub struct ConditionOptimized;

impl PhysicalPass for ConditionOptimized {
    fn name(&self) -> &str {
        "ConditionOptimized"
    }

    fn transform(&self, nodes: &mut NodeManager, node: NodeId) -> Option<NodeId> {
        let current = nodes.get(node);
        let join = current.op().as_join()?;
        let condition = join.filter.condition.as_ref()?;
        let left_len = nodes.get(current.producer(0)?).output_schemas().len();

        let split = split_join_condition(condition, current.output_schemas(), left_len);
        if split.left_keys.is_empty() {
            return None;
        }

        let mut new_join: Join = join.clone();
        new_join.left_hash.keys.extend(split.left_keys);
        new_join.right_partition.groups.extend(split.right_keys);
        new_join.filter = ConditionFilter::new(split.residual);

        let op = match current.op() {
            PhysicalOp::RequestJoin(_) => PhysicalOp::RequestJoin(new_join),
            _ => PhysicalOp::Join(new_join),
        };
        Some(nodes.with_op(node, op))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{DataType, TableDef};
    use crate::planner::logical::JoinType;
    use crate::planner::ops::DataProvider;
    use crate::planner::optimizer::apply_pass;
    use crate::sql::Expr;

    fn scan(nodes: &mut NodeManager, name: &str) -> NodeId {
        let table = Arc::new(
            TableDef::builder(name)
                .add_column("col1", DataType::Int64)
                .add_column("col2", DataType::Int64)
                .build()
                .unwrap(),
        );
        nodes.make(PhysicalOp::DataProvider(DataProvider::table(table)), vec![])
    }

    fn join(nodes: &mut NodeManager, request: bool, condition: Expr) -> NodeId {
        let left = scan(nodes, "t1");
        let right = scan(nodes, "t2");
        let join = Join::new(JoinType::Inner, Some(condition));
        let op = if request {
            PhysicalOp::RequestJoin(join)
        } else {
            PhysicalOp::Join(join)
        };
        nodes.make(op, vec![left, right])
    }

    #[test]
    fn test_keys_pulled_from_conjunction() {
        let residual = Expr::qualified("t1", "col2").gt(Expr::int(5));
        let condition = Expr::qualified("t2", "col1")
            .eq(Expr::qualified("t1", "col1"))
            .nested()
            .and(residual.clone());

        let mut nodes = NodeManager::new();
        let node = join(&mut nodes, false, condition);
        let root = apply_pass(&ConditionOptimized, &mut nodes, node);
        let join = nodes.get(root).op().as_join().unwrap();
        assert_eq!(join.left_hash.keys, vec![Expr::qualified("t1", "col1")]);
        assert_eq!(join.right_partition.groups, vec![Expr::qualified("t2", "col1")]);
        assert_eq!(join.filter.condition, Some(residual));

        // Only the residual is left, so a second run has nothing to do.
        assert_eq!(apply_pass(&ConditionOptimized, &mut nodes, root), root);
    }

    #[test]
    fn test_request_join_keeps_variant() {
        let condition = Expr::qualified("t1", "col1").eq(Expr::qualified("t2", "col1"));
        let mut nodes = NodeManager::new();
        let node = join(&mut nodes, true, condition);
        let root = apply_pass(&ConditionOptimized, &mut nodes, node);
        assert!(matches!(
            nodes.get(root).op(),
            PhysicalOp::RequestJoin(j) if j.filter.condition.is_none() && j.left_hash.keys.len() == 1
        ));
    }

    #[test]
    fn test_no_equi_pairs() {
        let disjunction = Expr::qualified("t1", "col1")
            .eq(Expr::qualified("t2", "col1"))
            .or(Expr::qualified("t1", "col2").eq(Expr::qualified("t2", "col2")));
        let same_side = Expr::qualified("t1", "col1").eq(Expr::qualified("t1", "col2"));

        let mut nodes = NodeManager::new();
        for condition in [disjunction, same_side] {
            let node = join(&mut nodes, false, condition);
            assert_eq!(apply_pass(&ConditionOptimized, &mut nodes, node), node);
        }
    }
}
