//! Physical query plan representation.
//!
//! Physical plans specify *how* a query executes. Nodes are owned by a
//! [`NodeManager`] arena and addressed by [`NodeId`]; a node may be the
//! producer of several consumers. The output schema, output shape and
//! blocking flag of a node are derived from its operator and producers
//! when it is created.

use std::fmt;

use crate::catalog::{flatten_schemas, NamedSchema, Schema};

use super::ops::{
    ConditionFilter, DataProvider, Group, Join, Project, ProjectType, ProviderType, Sort,
    WindowOp,
};

/// Identity of a physical node inside its [`NodeManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shape of the rows a node emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Row,
    Group,
    Table,
}

/// Physical operators.
#[derive(Debug, Clone)]
pub enum PhysicalOp {
    DataProvider(DataProvider),
    /// Row cap; the count lives in the node's `limit_cnt`.
    Limit { optimized: bool },
    Filter(ConditionFilter),
    GroupBy(Group),
    SortBy(Sort),
    Join(Join),
    RequestJoin(Join),
    Union { is_all: bool },
    /// Request row unioned with the window rows drawn from producer 1.
    RequestUnion(WindowOp),
    Project(Project),
    Rename { name: String },
    Distinct,
}

impl PhysicalOp {
    pub fn type_name(&self) -> &'static str {
        match self {
            PhysicalOp::DataProvider(_) => "DATA_PROVIDER",
            PhysicalOp::Limit { .. } => "LIMIT",
            PhysicalOp::Filter(_) => "FILTER",
            PhysicalOp::GroupBy(_) => "GROUP_BY",
            PhysicalOp::SortBy(_) => "SORT_BY",
            PhysicalOp::Join(_) => "JOIN",
            PhysicalOp::RequestJoin(_) => "REQUEST_JOIN",
            PhysicalOp::Union { .. } => "UNION",
            PhysicalOp::RequestUnion(_) => "REQUEST_UNION",
            PhysicalOp::Project(_) => "PROJECT",
            PhysicalOp::Rename { .. } => "RENAME",
            PhysicalOp::Distinct => "DISTINCT",
        }
    }

    /// Whether the operator must consume its whole input before emitting.
    pub fn is_block(&self) -> bool {
        match self {
            PhysicalOp::GroupBy(_)
            | PhysicalOp::SortBy(_)
            | PhysicalOp::Distinct
            | PhysicalOp::RequestUnion(_) => true,
            PhysicalOp::Project(p) => !p.project_type.is_row_mode(),
            _ => false,
        }
    }

    pub fn as_provider(&self) -> Option<&DataProvider> {
        match self {
            PhysicalOp::DataProvider(p) => Some(p),
            _ => None,
        }
    }

    /// Join descriptor of a batch or request join.
    pub fn as_join(&self) -> Option<&Join> {
        match self {
            PhysicalOp::Join(j) | PhysicalOp::RequestJoin(j) => Some(j),
            _ => None,
        }
    }
}

/// A physical plan node.
#[derive(Debug, Clone)]
pub struct PhysicalNode {
    op: PhysicalOp,
    producers: Vec<NodeId>,
    output_schemas: Vec<NamedSchema>,
    output_schema: Schema,
    output_type: SchemaType,
    is_block: bool,
    limit_cnt: Option<usize>,
}

impl PhysicalNode {
    pub fn op(&self) -> &PhysicalOp {
        &self.op
    }

    pub fn producers(&self) -> &[NodeId] {
        &self.producers
    }

    pub fn producer(&self, idx: usize) -> Option<NodeId> {
        self.producers.get(idx).copied()
    }

    /// Ordered `(relation, schema)` list used for column resolution.
    pub fn output_schemas(&self) -> &[NamedSchema] {
        &self.output_schemas
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    pub fn output_type(&self) -> SchemaType {
        self.output_type
    }

    pub fn is_block(&self) -> bool {
        self.is_block
    }

    pub fn limit_cnt(&self) -> Option<usize> {
        self.limit_cnt
    }

    pub fn is_request_provider(&self) -> bool {
        self.op.as_provider().is_some_and(|p| p.is_request())
    }

    pub fn is_table_provider(&self) -> bool {
        self.op.as_provider().is_some_and(|p| p.is_table())
    }
}

/// Arena owning every physical node created during one transformation.
#[derive(Debug, Default)]
pub struct NodeManager {
    nodes: Vec<PhysicalNode>,
}

impl NodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node lookup. Ids are only minted by this arena, so every id is valid.
    pub fn get(&self, id: NodeId) -> &PhysicalNode {
        &self.nodes[id.0]
    }

    /// Create a node, deriving its output schema and shape.
    pub fn make(&mut self, op: PhysicalOp, producers: Vec<NodeId>) -> NodeId {
        self.push(op, producers, None)
    }

    pub fn make_limit(&mut self, input: NodeId, limit: usize) -> NodeId {
        self.push(PhysicalOp::Limit { optimized: false }, vec![input], Some(limit))
    }

    /// Copy of `id` with a new operator and producers; the limit is kept.
    pub fn derive(&mut self, id: NodeId, op: PhysicalOp, producers: Vec<NodeId>) -> NodeId {
        let limit_cnt = self.get(id).limit_cnt;
        self.push(op, producers, limit_cnt)
    }

    /// Copy of `id` reading from new producers.
    pub fn with_producers(&mut self, id: NodeId, producers: Vec<NodeId>) -> NodeId {
        let op = self.get(id).op.clone();
        self.derive(id, op, producers)
    }

    /// Copy of `id` with a new operator over the same producers.
    pub fn with_op(&mut self, id: NodeId, op: PhysicalOp) -> NodeId {
        let producers = self.get(id).producers.clone();
        self.derive(id, op, producers)
    }

    /// Copy of `id` capped at `limit` rows.
    pub fn with_limit(&mut self, id: NodeId, limit: usize) -> NodeId {
        let mut node = self.get(id).clone();
        node.limit_cnt = Some(limit);
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Replace the operator in place. Only used by code generation, which
    /// fills in compiled functions without changing the output shape.
    pub(crate) fn set_op(&mut self, id: NodeId, op: PhysicalOp) {
        self.nodes[id.0].op = op;
    }

    fn push(&mut self, op: PhysicalOp, producers: Vec<NodeId>, limit_cnt: Option<usize>) -> NodeId {
        let (output_schemas, output_type) = self.derive_output(&op, &producers);
        let node = PhysicalNode {
            output_schema: flatten_schemas(&output_schemas),
            is_block: op.is_block(),
            op,
            producers,
            output_schemas,
            output_type,
            limit_cnt,
        };
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn derive_output(&self, op: &PhysicalOp, producers: &[NodeId]) -> (Vec<NamedSchema>, SchemaType) {
        let input = |idx: usize| producers.get(idx).map(|&id| self.get(id));
        let forward = |idx: usize| {
            input(idx)
                .map(|n| (n.output_schemas.clone(), n.output_type))
                .unwrap_or((Vec::new(), SchemaType::Table))
        };

        match op {
            PhysicalOp::DataProvider(provider) => {
                let named = NamedSchema::new(provider.table.name(), provider.table.schema().clone());
                let output_type = match provider.provider_type {
                    ProviderType::Table => SchemaType::Table,
                    ProviderType::Partition { .. } => SchemaType::Group,
                    ProviderType::Request => SchemaType::Row,
                };
                (vec![named], output_type)
            }
            PhysicalOp::Limit { .. }
            | PhysicalOp::Filter(_)
            | PhysicalOp::SortBy(_)
            | PhysicalOp::Distinct
            | PhysicalOp::Union { .. } => forward(0),
            PhysicalOp::GroupBy(_) => (forward(0).0, SchemaType::Group),
            PhysicalOp::RequestUnion(_) => (forward(0).0, SchemaType::Table),
            PhysicalOp::Join(_) | PhysicalOp::RequestJoin(_) => {
                let (mut schemas, output_type) = forward(0);
                schemas.extend(forward(1).0);
                (schemas, output_type)
            }
            PhysicalOp::Rename { name } => {
                let (schemas, output_type) = forward(0);
                (vec![NamedSchema::new(name.clone(), flatten_schemas(&schemas))], output_type)
            }
            PhysicalOp::Project(project) => {
                let output_type = match project.project_type {
                    ProjectType::Row | ProjectType::Aggregation => SchemaType::Row,
                    ProjectType::Table
                    | ProjectType::GroupAggregation
                    | ProjectType::WindowAggregation => SchemaType::Table,
                };
                (vec![NamedSchema::new("", project.fn_info.fn_schema.clone())], output_type)
            }
        }
    }
}

/// A transformed plan: the node arena plus the root to execute.
#[derive(Debug)]
pub struct PhysicalPlan {
    pub nodes: NodeManager,
    pub root: NodeId,
}

impl PhysicalPlan {
    pub fn new(nodes: NodeManager, root: NodeId) -> Self {
        Self { nodes, root }
    }

    pub fn root_node(&self) -> &PhysicalNode {
        self.nodes.get(self.root)
    }

    pub fn output_schema(&self) -> &Schema {
        self.root_node().output_schema()
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_node(f, self.root, 0)
    }
}

impl PhysicalPlan {
    fn format_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        let node = self.nodes.get(id);
        write!(f, "{}{}", pad, node.op.type_name())?;

        match &node.op {
            PhysicalOp::DataProvider(p) => match &p.provider_type {
                ProviderType::Table => write!(f, "(type=Table, table={})", p.table.name())?,
                ProviderType::Partition { index_name, .. } => write!(
                    f,
                    "(type=Partition, table={}, index={})",
                    p.table.name(),
                    index_name
                )?,
                ProviderType::Request => write!(f, "(type=Request, table={})", p.table.name())?,
            },
            PhysicalOp::Filter(filter) => {
                if let Some(cond) = &filter.condition {
                    write!(f, "(condition={})", cond)?;
                }
            }
            PhysicalOp::GroupBy(group) => write!(f, "(group_keys={})", exprs(&group.groups))?,
            PhysicalOp::SortBy(sort) => write!(f, "(orders={})", exprs(sort.exprs()))?,
            PhysicalOp::Join(join) | PhysicalOp::RequestJoin(join) => {
                write!(f, "(type={}", join.join_type)?;
                if let Some(cond) = &join.filter.condition {
                    write!(f, ", condition={}", cond)?;
                }
                if !join.left_hash.keys.is_empty() {
                    write!(
                        f,
                        ", left_keys={}, right_keys={}",
                        exprs(&join.left_hash.keys),
                        exprs(&join.right_partition.groups)
                    )?;
                }
                write!(f, ")")?;
            }
            PhysicalOp::Union { is_all } => write!(f, "(all={})", is_all)?,
            PhysicalOp::RequestUnion(window) => write!(
                f,
                "(groups={}, orders={}, range=({}, {}))",
                exprs(&window.group.groups),
                exprs(window.sort.exprs()),
                window.start_offset,
                window.end_offset
            )?,
            PhysicalOp::Project(project) => {
                write!(f, "(type={:?}", project.project_type)?;
                if let Some(window) = &project.window {
                    write!(
                        f,
                        ", groups={}, orders={}",
                        exprs(&window.group.groups),
                        exprs(window.sort.exprs())
                    )?;
                }
                write!(f, ")")?;
            }
            PhysicalOp::Rename { name } => write!(f, "(name={})", name)?,
            PhysicalOp::Limit { .. } | PhysicalOp::Distinct => {}
        }
        if let Some(limit) = node.limit_cnt {
            write!(f, " limit={}", limit)?;
        }
        writeln!(f)?;

        for &producer in &node.producers {
            self.format_node(f, producer, indent + 1)?;
        }
        Ok(())
    }
}

fn exprs(list: &[crate::sql::Expr]) -> String {
    let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{DataType, TableDef, TableHandle};
    use crate::codegen::FnInfo;
    use crate::planner::JoinType;
    use crate::sql::Expr;

    fn table(name: &str) -> Arc<dyn TableHandle> {
        Arc::new(
            TableDef::builder(name)
                .add_column("col1", DataType::Int32)
                .add_column("col2", DataType::String)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_provider_shapes() {
        let mut nodes = NodeManager::new();
        let scan = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t1"))), vec![]);
        let request = nodes.make(PhysicalOp::DataProvider(DataProvider::request(table("t1"))), vec![]);
        let partition = nodes.make(
            PhysicalOp::DataProvider(DataProvider::partition(
                table("t1"),
                "index1".into(),
                vec![Expr::column("col1")],
            )),
            vec![],
        );

        assert_eq!(nodes.get(scan).output_type(), SchemaType::Table);
        assert_eq!(nodes.get(request).output_type(), SchemaType::Row);
        assert_eq!(nodes.get(partition).output_type(), SchemaType::Group);
        assert_eq!(nodes.get(scan).output_schemas()[0].relation, "t1");
        assert!(nodes.get(request).is_request_provider());
        assert!(!nodes.get(scan).is_block());
    }

    #[test]
    fn test_join_and_rename_schemas() {
        let mut nodes = NodeManager::new();
        let left = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t1"))), vec![]);
        let right = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t2"))), vec![]);
        let join = nodes.make(
            PhysicalOp::Join(Join::new(JoinType::Inner, None)),
            vec![left, right],
        );
        let relations: Vec<&str> = nodes
            .get(join)
            .output_schemas()
            .iter()
            .map(|s| s.relation.as_str())
            .collect();
        assert_eq!(relations, vec!["t1", "t2"]);
        assert_eq!(nodes.get(join).output_schema().len(), 4);

        let rename = nodes.make(PhysicalOp::Rename { name: "x".into() }, vec![join]);
        let schemas = nodes.get(rename).output_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].relation, "x");
        assert_eq!(schemas[0].schema.len(), 4);
    }

    #[test]
    fn test_group_and_project_shapes() {
        let mut nodes = NodeManager::new();
        let scan = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t1"))), vec![]);
        let group = nodes.make(PhysicalOp::GroupBy(Group::new(vec![Expr::column("col1")])), vec![scan]);
        assert_eq!(nodes.get(group).output_type(), SchemaType::Group);
        assert!(nodes.get(group).is_block());

        let fn_schema = Schema::new(vec![crate::catalog::ColumnDef::new("n", DataType::Int64)]);
        let project = nodes.make(
            PhysicalOp::Project(Project {
                project_type: ProjectType::GroupAggregation,
                projects: Vec::new(),
                fn_info: FnInfo::new("f", fn_schema.clone()),
                group: None,
                window: None,
            }),
            vec![group],
        );
        let node = nodes.get(project);
        assert_eq!(node.output_type(), SchemaType::Table);
        assert_eq!(node.output_schema(), &fn_schema);
        assert!(node.is_block());
    }

    #[test]
    fn test_copies_keep_original() {
        let mut nodes = NodeManager::new();
        let scan = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t1"))), vec![]);
        let limited = nodes.with_limit(scan, 10);
        assert_ne!(limited, scan);
        assert_eq!(nodes.get(scan).limit_cnt(), None);
        assert_eq!(nodes.get(limited).limit_cnt(), Some(10));

        let limit = nodes.make_limit(scan, 5);
        let moved = nodes.with_producers(limit, vec![limited]);
        assert_eq!(nodes.get(moved).limit_cnt(), Some(5));
        assert_eq!(nodes.get(moved).producers(), &[limited]);
    }

    #[test]
    fn test_explain() {
        let mut nodes = NodeManager::new();
        let scan = nodes.make(PhysicalOp::DataProvider(DataProvider::table(table("t1"))), vec![]);
        let filter = nodes.make(
            PhysicalOp::Filter(ConditionFilter::new(Some(Expr::column("col1").gt(Expr::int(1))))),
            vec![scan],
        );
        let limit = nodes.make_limit(filter, 3);
        let plan = PhysicalPlan::new(nodes, limit);
        assert_eq!(
            plan.to_string(),
            "LIMIT limit=3\n  FILTER(condition=col1 > 1)\n    DATA_PROVIDER(type=Table, table=t1)\n"
        );
    }
}
