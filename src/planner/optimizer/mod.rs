//! Rewrite passes over physical plans.
//!
//! Each pass visits the plan bottom-up. A node whose producers were rewritten
//! is copied onto the new producers before the pass looks at it; a node the
//! pass does not apply to is kept as is. Original nodes are never mutated, and
//! a producer shared by several consumers is rewritten once.

mod condition;
mod group_sort;
mod left_join;
mod limit;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::physical::{NodeId, NodeManager};

pub use condition::ConditionOptimized;
pub use group_sort::GroupAndSortOptimized;
pub use left_join::LeftJoinOptimized;
pub use limit::LimitOptimized;

/// A physical plan rewrite.
pub trait PhysicalPass {
    /// Name of the pass.
    fn name(&self) -> &str;

    /// Rewrite `node`, whose producers have already been visited.
    ///
    /// Returns the replacement node, or `None` when the pass does not apply.
    fn transform(&self, nodes: &mut NodeManager, node: NodeId) -> Option<NodeId>;
}

/// Built-in passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassType {
    ConditionOptimized,
    LeftJoinOptimized,
    GroupAndSortOptimized,
    LimitOptimized,
}

impl PassType {
    /// Order the transformer runs passes in by default.
    pub fn default_order() -> [PassType; 4] {
        [
            PassType::ConditionOptimized,
            PassType::LeftJoinOptimized,
            PassType::GroupAndSortOptimized,
            PassType::LimitOptimized,
        ]
    }

    pub fn build(self) -> Box<dyn PhysicalPass> {
        match self {
            PassType::ConditionOptimized => Box::new(ConditionOptimized),
            PassType::LeftJoinOptimized => Box::new(LeftJoinOptimized),
            PassType::GroupAndSortOptimized => Box::new(GroupAndSortOptimized),
            PassType::LimitOptimized => Box::new(LimitOptimized),
        }
    }
}

/// Run one pass over the plan rooted at `root`, returning the new root.
pub fn apply_pass(pass: &dyn PhysicalPass, nodes: &mut NodeManager, root: NodeId) -> NodeId {
    let mut rewritten = HashMap::new();
    apply_bottom_up(pass, nodes, root, &mut rewritten)
}

/// Run `passes` in order.
pub fn apply_passes(passes: &[PassType], nodes: &mut NodeManager, root: NodeId) -> NodeId {
    passes.iter().fold(root, |root, pass| {
        let pass = pass.build();
        let new_root = apply_pass(pass.as_ref(), nodes, root);
        debug!(pass = pass.name(), from = %root, to = %new_root, "applied pass");
        new_root
    })
}

fn apply_bottom_up(
    pass: &dyn PhysicalPass,
    nodes: &mut NodeManager,
    id: NodeId,
    rewritten: &mut HashMap<NodeId, NodeId>,
) -> NodeId {
    if let Some(&done) = rewritten.get(&id) {
        return done;
    }

    let producers = nodes.get(id).producers().to_vec();
    let new_producers: Vec<NodeId> = producers
        .iter()
        .map(|&p| apply_bottom_up(pass, nodes, p, rewritten))
        .collect();
    let current = if new_producers != producers {
        nodes.with_producers(id, new_producers)
    } else {
        id
    };

    let output = match pass.transform(nodes, current) {
        Some(new) => {
            debug!(pass = pass.name(), node = %current, to = %new, "rewrote node");
            new
        }
        None => current,
    };
    rewritten.insert(id, output);
    output
}
