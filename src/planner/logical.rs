//! Logical query plan representation.
//!
//! Logical plans describe *what* a query does. Nodes live in an arena owned by
//! [`LogicalPlan`] and refer to their inputs by [`PlanId`], so the same subtree
//! may be referenced from several parents. The transformer treats the arena as
//! read-only.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::{AllExpr, Expr, FnDef, OrderBy, WindowSpec};

/// Identity of a logical node inside its [`LogicalPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(usize);

impl PlanId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Join types supported by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left join keeping only the last matching right row.
    Last,
    /// Row-wise concatenation of two equally long inputs.
    Concat,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
            JoinType::Last => write!(f, "LAST"),
            JoinType::Concat => write!(f, "CONCAT"),
        }
    }
}

/// One output column of a projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub position: usize,
    pub name: String,
    pub expr: Expr,
}

impl ProjectItem {
    pub fn new(position: usize, name: impl Into<String>, expr: Expr) -> Self {
        Self {
            position,
            name: name.into(),
            expr,
        }
    }
}

/// Projection items sharing one optional window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSpec>,
    #[serde(default)]
    pub is_window_agg: bool,
    pub projects: Vec<ProjectItem>,
}

impl ProjectList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate the list over `window`.
    pub fn over(mut self, window: WindowSpec) -> Self {
        self.window = Some(window);
        self.is_window_agg = true;
        self
    }

    /// Append an item at the next position.
    pub fn push(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.add_project(name, expr);
        self
    }

    pub fn add_project(&mut self, name: impl Into<String>, expr: Expr) {
        let position = self.projects.len();
        self.projects.push(ProjectItem::new(position, name, expr));
    }

    /// Append an unexpanded `*` item.
    pub fn add_wildcard(&mut self) {
        self.add_project("*", Expr::All(AllExpr::default()));
    }
}

/// Logical plan node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanNode {
    /// Scan a table. The primary table feeds the request row in request mode.
    Table {
        table: String,
        #[serde(default)]
        is_primary: bool,
    },

    Limit { input: PlanId, limit: usize },

    Filter { input: PlanId, condition: Expr },

    /// One or more project lists. `pos_mapping` gives, for each final output
    /// position, the `(list, item)` it is taken from.
    Project {
        input: PlanId,
        project_lists: Vec<ProjectList>,
        #[serde(default)]
        pos_mapping: Vec<(usize, usize)>,
    },

    Join {
        left: PlanId,
        right: PlanId,
        join_type: JoinType,
        #[serde(default)]
        condition: Option<Expr>,
    },

    Union {
        left: PlanId,
        right: PlanId,
        #[serde(default)]
        is_all: bool,
    },

    Group { input: PlanId, keys: Vec<Expr> },

    Sort { input: PlanId, order: OrderBy },

    Rename { input: PlanId, table: String },

    Distinct { input: PlanId },

    /// Query root wrapping its body.
    Query { input: PlanId },

    FuncDef { def: FnDef },
}

impl PlanNode {
    /// Inputs of this node, left to right.
    pub fn children(&self) -> Vec<PlanId> {
        match self {
            PlanNode::Table { .. } | PlanNode::FuncDef { .. } => Vec::new(),
            PlanNode::Limit { input, .. }
            | PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Group { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Rename { input, .. }
            | PlanNode::Distinct { input }
            | PlanNode::Query { input } => vec![*input],
            PlanNode::Join { left, right, .. } | PlanNode::Union { left, right, .. } => {
                vec![*left, *right]
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PlanNode::Table { .. } => "Table",
            PlanNode::Limit { .. } => "Limit",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Project { .. } => "Project",
            PlanNode::Join { .. } => "Join",
            PlanNode::Union { .. } => "Union",
            PlanNode::Group { .. } => "Group",
            PlanNode::Sort { .. } => "Sort",
            PlanNode::Rename { .. } => "Rename",
            PlanNode::Distinct { .. } => "Distinct",
            PlanNode::Query { .. } => "Query",
            PlanNode::FuncDef { .. } => "FuncDef",
        }
    }
}

/// Arena of logical plan nodes.
///
/// The builder methods only accept ids that already exist, so plans built
/// through them are acyclic. Plans deserialized from JSON are not checked
/// here; the transformer rejects dangling ids and bounds recursion depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalPlan {
    nodes: Vec<PlanNode>,
}

impl LogicalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: PlanId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    /// Most recently added node, the root of a bottom-up built plan.
    pub fn last(&self) -> Option<PlanId> {
        self.nodes.len().checked_sub(1).map(PlanId)
    }

    pub fn add(&mut self, node: PlanNode) -> PlanId {
        self.nodes.push(node);
        PlanId(self.nodes.len() - 1)
    }

    pub fn table(&mut self, table: impl Into<String>) -> PlanId {
        self.add(PlanNode::Table {
            table: table.into(),
            is_primary: false,
        })
    }

    /// Scan of the table the request row belongs to.
    pub fn primary_table(&mut self, table: impl Into<String>) -> PlanId {
        self.add(PlanNode::Table {
            table: table.into(),
            is_primary: true,
        })
    }

    pub fn limit(&mut self, input: PlanId, limit: usize) -> PlanId {
        self.add(PlanNode::Limit { input, limit })
    }

    pub fn filter(&mut self, input: PlanId, condition: Expr) -> PlanId {
        self.add(PlanNode::Filter { input, condition })
    }

    /// Single-list projection.
    pub fn project(&mut self, input: PlanId, list: ProjectList) -> PlanId {
        self.add(PlanNode::Project {
            input,
            project_lists: vec![list],
            pos_mapping: Vec::new(),
        })
    }

    pub fn multi_project(
        &mut self,
        input: PlanId,
        project_lists: Vec<ProjectList>,
        pos_mapping: Vec<(usize, usize)>,
    ) -> PlanId {
        self.add(PlanNode::Project {
            input,
            project_lists,
            pos_mapping,
        })
    }

    pub fn join(
        &mut self,
        left: PlanId,
        right: PlanId,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> PlanId {
        self.add(PlanNode::Join {
            left,
            right,
            join_type,
            condition,
        })
    }

    pub fn union(&mut self, left: PlanId, right: PlanId, is_all: bool) -> PlanId {
        self.add(PlanNode::Union { left, right, is_all })
    }

    pub fn group(&mut self, input: PlanId, keys: Vec<Expr>) -> PlanId {
        self.add(PlanNode::Group { input, keys })
    }

    pub fn sort(&mut self, input: PlanId, order: OrderBy) -> PlanId {
        self.add(PlanNode::Sort { input, order })
    }

    pub fn rename(&mut self, input: PlanId, table: impl Into<String>) -> PlanId {
        self.add(PlanNode::Rename {
            input,
            table: table.into(),
        })
    }

    pub fn distinct(&mut self, input: PlanId) -> PlanId {
        self.add(PlanNode::Distinct { input })
    }

    pub fn query(&mut self, input: PlanId) -> PlanId {
        self.add(PlanNode::Query { input })
    }

    pub fn func_def(&mut self, def: FnDef) -> PlanId {
        self.add(PlanNode::FuncDef { def })
    }

    /// Get the tables scanned under `root`.
    pub fn referenced_tables(&self, root: PlanId) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            match self.get(id) {
                Some(PlanNode::Table { table, .. }) => {
                    tables.insert(table.clone());
                }
                Some(node) => stack.extend(node.children()),
                None => {}
            }
        }
        tables
    }

    /// Indented rendering of the tree under `root`.
    pub fn explain(&self, root: PlanId) -> String {
        let mut out = String::new();
        self.format_indent(&mut out, root, 0);
        out
    }

    fn format_indent(&self, out: &mut String, id: PlanId, indent: usize) {
        use std::fmt::Write;

        let pad = "  ".repeat(indent);
        let Some(node) = self.get(id) else {
            let _ = writeln!(out, "{}<missing {}>", pad, id);
            return;
        };
        let _ = match node {
            PlanNode::Table { table, is_primary } => {
                writeln!(out, "{}Table: {}{}", pad, table, if *is_primary { " (primary)" } else { "" })
            }
            PlanNode::Limit { limit, .. } => writeln!(out, "{}Limit: {}", pad, limit),
            PlanNode::Filter { condition, .. } => writeln!(out, "{}Filter: {}", pad, condition),
            PlanNode::Project { project_lists, .. } => {
                let lists: Vec<String> = project_lists
                    .iter()
                    .map(|list| {
                        let items: Vec<String> =
                            list.projects.iter().map(|p| p.expr.to_string()).collect();
                        format!("[{}]", items.join(", "))
                    })
                    .collect();
                writeln!(out, "{}Project: {}", pad, lists.join(" "))
            }
            PlanNode::Join {
                join_type,
                condition,
                ..
            } => match condition {
                Some(cond) => writeln!(out, "{}Join: {} ON {}", pad, join_type, cond),
                None => writeln!(out, "{}Join: {}", pad, join_type),
            },
            PlanNode::Union { is_all, .. } => {
                writeln!(out, "{}Union{}", pad, if *is_all { " ALL" } else { "" })
            }
            PlanNode::Group { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                writeln!(out, "{}Group: [{}]", pad, keys.join(", "))
            }
            PlanNode::Sort { order, .. } => writeln!(out, "{}Sort: {}", pad, order),
            PlanNode::Rename { table, .. } => writeln!(out, "{}Rename: {}", pad, table),
            PlanNode::Distinct { .. } => writeln!(out, "{}Distinct", pad),
            PlanNode::Query { .. } => writeln!(out, "{}Query", pad),
            PlanNode::FuncDef { def } => writeln!(out, "{}FuncDef: {}", pad, def.name),
        };
        for child in node.children() {
            self.format_indent(out, child, indent + 1);
        }
    }
}
