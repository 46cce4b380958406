//! Logical to physical plan transformation.
//!
//! [`Transformer`] lowers a logical plan into physical nodes, runs the
//! configured rewrite passes and attaches compiled functions to every
//! operator that evaluates expressions. In request mode the primary table is
//! read as a single request row and windows are built by unioning that row
//! with the table's history.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::config::{TransformMode, TransformerConfig};
use super::error::{PlanError, PlanResult};
use super::logical::{JoinType, LogicalPlan, PlanId, PlanNode, ProjectItem, ProjectList};
use super::ops::{
    ConditionFilter, DataProvider, Group, Hash, Join, Project, ProjectType, ProviderType, Sort,
    WindowOp,
};
use super::optimizer;
use super::physical::{NodeId, NodeManager, PhysicalOp, PhysicalPlan, SchemaType};
use super::schemas::{ExprSource, SchemasContext};
use crate::catalog::{Catalog, NamedSchema, Schema, TableHandle};
use crate::codegen::{CodeGenerator, FnInfo};
use crate::sql::{AllExpr, ColumnRef, Expr, FnDef, WindowSpec, UNBOUNDED};

/// Converts logical plans into physical plans.
///
/// Node identity is preserved: a logical node reachable through several
/// parents is lowered once and its physical node is shared.
pub struct Transformer {
    config: TransformerConfig,
    catalog: Arc<dyn Catalog>,
    codegen: Box<dyn CodeGenerator>,
    nodes: NodeManager,
    op_map: HashMap<PlanId, NodeId>,
    request_name: Option<String>,
    request_schema: Option<Schema>,
    depth: usize,
}

impl Transformer {
    pub fn new(
        config: TransformerConfig,
        catalog: Arc<dyn Catalog>,
        codegen: Box<dyn CodeGenerator>,
    ) -> Self {
        Self {
            config,
            catalog,
            codegen,
            nodes: NodeManager::new(),
            op_map: HashMap::new(),
            request_name: None,
            request_schema: None,
            depth: 0,
        }
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn nodes(&self) -> &NodeManager {
        &self.nodes
    }

    /// Name of the request table, once a primary scan was lowered in request mode.
    pub fn request_name(&self) -> Option<&str> {
        self.request_name.as_deref()
    }

    pub fn request_schema(&self) -> Option<&Schema> {
        self.request_schema.as_ref()
    }

    /// Transform, optimize and compile `trees`, returning the query plan.
    pub fn compile(mut self, plan: &LogicalPlan, trees: &[PlanId]) -> PlanResult<PhysicalPlan> {
        let root = self
            .transform_physical_plan(plan, trees)?
            .ok_or_else(|| fail(PlanError::InvalidPlan("no query in logical trees".into())))?;
        Ok(PhysicalPlan::new(self.nodes, root))
    }

    /// Transform each top-level tree in order.
    ///
    /// Function definitions are compiled and registered; a query or union
    /// is lowered, optimized and compiled. Returns the root of the last query.
    pub fn transform_physical_plan(
        &mut self,
        plan: &LogicalPlan,
        trees: &[PlanId],
    ) -> PlanResult<Option<NodeId>> {
        if trees.is_empty() {
            return Err(fail(PlanError::InvalidPlan("logical trees is empty".into())));
        }

        self.op_map.clear();
        self.request_name = None;
        self.request_schema = None;
        let result = self.transform_trees(plan, trees);
        self.op_map.clear();
        result
    }

    fn transform_trees(&mut self, plan: &LogicalPlan, trees: &[PlanId]) -> PlanResult<Option<NodeId>> {
        let mut output = None;
        for &tree in trees {
            match self.plan_node(plan, tree)? {
                PlanNode::FuncDef { def } => self.gen_fn_def(def)?,
                PlanNode::Query { .. } | PlanNode::Union { .. } => {
                    let physical = self.transform_plan_op(plan, tree).map_err(|e| {
                        warn!(error = %e, "fail to transform query plan to physical plan");
                        e
                    })?;
                    let optimized = self.apply_passes(physical);
                    self.gen_plan_node(optimized)?;
                    output = Some(optimized);
                }
                other => {
                    return Err(fail(PlanError::Unsupported(format!(
                        "{} node at plan top level",
                        other.type_name()
                    ))))
                }
            }
        }
        Ok(output)
    }

    /// Run the configured passes over the plan rooted at `root`.
    pub fn apply_passes(&mut self, root: NodeId) -> NodeId {
        optimizer::apply_passes(&self.config.passes, &mut self.nodes, root)
    }

    /// Lower the logical node `id`, reusing the result for a node seen before.
    pub fn transform_plan_op(&mut self, plan: &LogicalPlan, id: PlanId) -> PlanResult<NodeId> {
        if let Some(&node) = self.op_map.get(&id) {
            debug!(plan_node = %id, node = %node, "reuse transformed node");
            return Ok(node);
        }

        let logical = self.plan_node(plan, id)?;
        if self.depth >= self.config.max_depth {
            return Err(fail(PlanError::TooDeep(self.config.max_depth)));
        }

        self.depth += 1;
        let result = self.lower(plan, logical);
        self.depth -= 1;

        let node = result.map_err(|e| {
            warn!(plan_node = logical.type_name(), "fail to transform physical plan");
            e
        })?;
        self.op_map.insert(id, node);
        Ok(node)
    }

    fn plan_node<'p>(&self, plan: &'p LogicalPlan, id: PlanId) -> PlanResult<&'p PlanNode> {
        plan.get(id)
            .ok_or_else(|| fail(PlanError::InvalidPlan(format!("unknown plan node {}", id))))
    }

    fn lower(&mut self, plan: &LogicalPlan, node: &PlanNode) -> PlanResult<NodeId> {
        match node {
            PlanNode::Table { table, is_primary } => self.transform_scan_op(table, *is_primary),
            PlanNode::Limit { input, limit } => {
                let child = self.transform_plan_op(plan, *input)?;
                Ok(self.nodes.make_limit(child, *limit))
            }
            PlanNode::Filter { input, condition } => {
                let child = self.transform_plan_op(plan, *input)?;
                let filter = ConditionFilter::new(Some(condition.clone()));
                Ok(self.nodes.make(PhysicalOp::Filter(filter), vec![child]))
            }
            PlanNode::Project {
                input,
                project_lists,
                pos_mapping,
            } => self.transform_project_plan_op(plan, *input, project_lists, pos_mapping),
            PlanNode::Join {
                left,
                right,
                join_type,
                condition,
            } => self.transform_join_op(plan, *left, *right, *join_type, condition.clone()),
            PlanNode::Union { left, right, is_all } => {
                let left = self.transform_plan_op(plan, *left)?;
                let right = self.transform_plan_op(plan, *right)?;
                Ok(self
                    .nodes
                    .make(PhysicalOp::Union { is_all: *is_all }, vec![left, right]))
            }
            PlanNode::Group { input, keys } => {
                let child = self.transform_plan_op(plan, *input)?;
                if self.nodes.get(child).is_request_provider() {
                    let window = WindowOp::new(Group::new(keys.clone()), Sort::new(None), UNBOUNDED, UNBOUNDED);
                    return self.make_request_union(child, window);
                }
                Ok(self
                    .nodes
                    .make(PhysicalOp::GroupBy(Group::new(keys.clone())), vec![child]))
            }
            PlanNode::Sort { input, order } => {
                let child = self.transform_plan_op(plan, *input)?;
                if self.nodes.get(child).is_request_provider() {
                    let sort = Sort::new(Some(order.clone()));
                    let window = WindowOp::new(Group::default(), sort, UNBOUNDED, UNBOUNDED);
                    return self.make_request_union(child, window);
                }
                let sort = Sort::new(Some(order.clone()));
                Ok(self.nodes.make(PhysicalOp::SortBy(sort), vec![child]))
            }
            PlanNode::Rename { input, table } => {
                let child = self.transform_plan_op(plan, *input)?;
                let op = PhysicalOp::Rename { name: table.clone() };
                Ok(self.nodes.make(op, vec![child]))
            }
            PlanNode::Distinct { input } => {
                let child = self.transform_plan_op(plan, *input)?;
                Ok(self.nodes.make(PhysicalOp::Distinct, vec![child]))
            }
            PlanNode::Query { input } => self.transform_plan_op(plan, *input),
            PlanNode::FuncDef { .. } => Err(fail(PlanError::Unsupported(
                "function definition inside a query".into(),
            ))),
        }
    }

    fn lookup_table(&self, name: &str) -> PlanResult<Arc<dyn TableHandle>> {
        self.catalog.get_table(&self.config.db, name).ok_or_else(|| {
            fail(PlanError::TableNotFound {
                db: self.config.db.clone(),
                table: name.to_string(),
            })
        })
    }

    fn transform_scan_op(&mut self, table: &str, is_primary: bool) -> PlanResult<NodeId> {
        let handle = self.lookup_table(table)?;
        let provider = if is_primary && self.config.mode == TransformMode::Request {
            self.request_name = Some(handle.name().to_string());
            self.request_schema = Some(handle.schema().clone());
            DataProvider::request(handle)
        } else {
            DataProvider::table(handle)
        };
        Ok(self.nodes.make(PhysicalOp::DataProvider(provider), vec![]))
    }

    fn transform_join_op(
        &mut self,
        plan: &LogicalPlan,
        left: PlanId,
        right: PlanId,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> PlanResult<NodeId> {
        let left = self.transform_plan_op(plan, left)?;
        let right = self.transform_plan_op(plan, right)?;
        let join = Join::new(join_type, condition);
        let op = match self.config.mode {
            TransformMode::Batch => PhysicalOp::Join(join),
            TransformMode::Request => PhysicalOp::RequestJoin(join),
        };
        Ok(self.nodes.make(op, vec![left, right]))
    }

    /// Union the request row with the history of its table.
    fn make_request_union(&mut self, request: NodeId, window: WindowOp) -> PlanResult<NodeId> {
        let name = match self.nodes.get(request).op().as_provider() {
            Some(provider) => provider.table.name().to_string(),
            None => {
                return Err(fail(PlanError::InvalidPlan(
                    "request union over a non-provider node".into(),
                )))
            }
        };
        let table = self.lookup_table(&name)?;
        let history = self
            .nodes
            .make(PhysicalOp::DataProvider(DataProvider::table(table)), vec![]);
        Ok(self
            .nodes
            .make(PhysicalOp::RequestUnion(window), vec![request, history]))
    }

    /// Build the window input of a request-mode projection.
    fn transform_window_op(&mut self, depend: NodeId, window: &WindowSpec) -> PlanResult<NodeId> {
        let node = self.nodes.get(depend);
        match node.op() {
            PhysicalOp::DataProvider(provider) if provider.is_request() => {
                self.make_request_union(depend, WindowOp::from(window))
            }
            PhysicalOp::RequestJoin(join) if join.is_left_or_last() => {
                let (Some(request), Some(right)) = (node.producer(0), node.producer(1)) else {
                    return Ok(depend);
                };
                if !self.nodes.get(request).is_request_provider() {
                    return Ok(depend);
                }

                let ctx = SchemasContext::new(node.output_schemas());
                if !from_left(&ctx, &window.keys) {
                    return Err(fail(PlanError::Window(
                        "group expression should belong to left table".into(),
                    )));
                }
                let orders = window.orders.as_ref().map(|o| o.exprs.as_slice()).unwrap_or(&[]);
                if !from_left(&ctx, orders) {
                    return Err(fail(PlanError::Window(
                        "order expression should belong to left table".into(),
                    )));
                }

                let join = join.clone();
                let union = self.make_request_union(request, WindowOp::from(window))?;
                Ok(self.nodes.make(PhysicalOp::Join(join), vec![union, right]))
            }
            _ => Ok(depend),
        }
    }

    fn transform_project_plan_op(
        &mut self,
        plan: &LogicalPlan,
        input: PlanId,
        lists: &[ProjectList],
        pos_mapping: &[(usize, usize)],
    ) -> PlanResult<NodeId> {
        let depend = self.transform_plan_op(plan, input)?;
        if lists.is_empty() {
            return Err(fail(PlanError::InvalidPlan(
                "fail to transform project op: empty projects".into(),
            )));
        }
        if lists.len() == 1 {
            return self.transform_project_op(&lists[0], depend);
        }
        check_pos_mapping(lists, pos_mapping)?;

        match self.config.mode {
            TransformMode::Batch => self.transform_batch_multi_project(lists, pos_mapping, depend),
            TransformMode::Request => {
                self.transform_request_multi_project(lists, pos_mapping, depend)
            }
        }
    }

    /// Chain the lists from last to second, each carrying the columns of the
    /// one below it, then project the first list plus the mapped outputs.
    fn transform_batch_multi_project(
        &mut self,
        lists: &[ProjectList],
        pos_mapping: &[(usize, usize)],
        depend: NodeId,
    ) -> PlanResult<NodeId> {
        let mut depend = depend;
        for list in lists[1..].iter().rev() {
            let mut list = list.clone();
            list.add_wildcard();
            depend = self.transform_project_op(&list, depend)?;
        }

        let first = &lists[0];
        let mut merged = ProjectList {
            window: first.window.clone(),
            is_window_agg: first.is_window_agg,
            projects: Vec::with_capacity(pos_mapping.len()),
        };
        for (pos, &(list_idx, item_idx)) in pos_mapping.iter().enumerate() {
            let item = &lists[list_idx].projects[item_idx];
            if list_idx == 0 {
                merged.projects.push(item.clone());
            } else {
                merged.projects.push(self.mapped_item(pos, item, depend));
            }
        }
        self.transform_project_op(&merged, depend)
    }

    /// Lower every list against the same input, concatenate the results row
    /// by row and project the mapped outputs.
    fn transform_request_multi_project(
        &mut self,
        lists: &[ProjectList],
        pos_mapping: &[(usize, usize)],
        depend: NodeId,
    ) -> PlanResult<NodeId> {
        let mut ops = Vec::with_capacity(lists.len());
        for list in lists {
            ops.push(self.transform_project_op(list, depend)?);
        }

        let mut joined = ops[0];
        for &op in &ops[1..] {
            let concat = PhysicalOp::RequestJoin(Join::new(JoinType::Concat, None));
            joined = self.nodes.make(concat, vec![joined, op]);
        }

        let mut merged = ProjectList::new();
        for (pos, &(list_idx, item_idx)) in pos_mapping.iter().enumerate() {
            let item = &lists[list_idx].projects[item_idx];
            merged.projects.push(self.mapped_item(pos, item, depend));
        }
        self.create_project_node(ProjectType::Row, joined, &merged)
    }

    /// Reference to an already computed output.
    ///
    /// Wildcards are expanded against `depend`. The expanded references are
    /// unqualified since they name project outputs, which carry no relation.
    fn mapped_item(&self, pos: usize, item: &ProjectItem, depend: NodeId) -> ProjectItem {
        match &item.expr {
            Expr::All(all) => {
                let mut expanded = self.expand_wildcard(all, depend);
                expanded.expanded = expanded
                    .expanded
                    .into_iter()
                    .map(|col| ColumnRef::new(col.column))
                    .collect();
                ProjectItem::new(pos, item.name.clone(), Expr::All(expanded))
            }
            _ => ProjectItem::new(pos, item.name.clone(), Expr::column(item.name.clone())),
        }
    }

    fn transform_project_op(&mut self, list: &ProjectList, depend: NodeId) -> PlanResult<NodeId> {
        let mut depend = depend;
        if self.config.mode == TransformMode::Request {
            if let Some(window) = &list.window {
                depend = self.transform_window_op(depend, window)?;
            }
        }

        let project_type = match self.nodes.get(depend).output_type() {
            SchemaType::Row => ProjectType::Row,
            SchemaType::Group => ProjectType::GroupAggregation,
            SchemaType::Table if list.is_window_agg => match self.config.mode {
                TransformMode::Batch => ProjectType::WindowAggregation,
                TransformMode::Request => ProjectType::Aggregation,
            },
            SchemaType::Table => ProjectType::Table,
        };
        self.create_project_node(project_type, depend, list)
    }

    fn create_project_node(
        &mut self,
        project_type: ProjectType,
        depend: NodeId,
        list: &ProjectList,
    ) -> PlanResult<NodeId> {
        if list.projects.is_empty() {
            return Err(fail(PlanError::InvalidPlan(
                "fail to create project node: project list is empty".into(),
            )));
        }

        let projects: Vec<ProjectItem> = list
            .projects
            .iter()
            .map(|item| match &item.expr {
                Expr::All(all) => ProjectItem::new(
                    item.position,
                    item.name.clone(),
                    Expr::All(self.expand_wildcard(all, depend)),
                ),
                _ => item.clone(),
            })
            .collect();

        let window = match project_type {
            ProjectType::WindowAggregation => match &list.window {
                Some(window) => Some(WindowOp::from(window)),
                None => {
                    return Err(fail(PlanError::InvalidPlan(
                        "window aggregation without window definition".into(),
                    )))
                }
            },
            _ => None,
        };
        let group = match project_type {
            ProjectType::GroupAggregation => Some(Group::new(self.group_keys_of(depend))),
            _ => None,
        };

        let exprs: Vec<(String, Expr)> = projects
            .iter()
            .map(|p| (p.name.clone(), p.expr.clone()))
            .collect();
        let inputs = self.nodes.get(depend).output_schemas().to_vec();
        let fn_info = self.compile_exprs(&inputs, &exprs, project_type.is_row_mode())?;

        let project = Project {
            project_type,
            projects,
            fn_info,
            group,
            window,
        };
        Ok(self.nodes.make(PhysicalOp::Project(project), vec![depend]))
    }

    /// Replace a bare wildcard with the columns of `depend`.
    ///
    /// A qualified wildcard keeps only the columns of that relation when the
    /// input still exposes it.
    fn expand_wildcard(&self, all: &AllExpr, depend: NodeId) -> AllExpr {
        if all.is_expanded() {
            return all.clone();
        }

        let schemas = self.nodes.get(depend).output_schemas();
        let relation = all
            .relation
            .as_deref()
            .filter(|r| !r.is_empty() && schemas.iter().any(|s| s.relation == *r));

        let mut expanded = Vec::new();
        for named in schemas {
            if relation.is_some_and(|r| named.relation != r) {
                continue;
            }
            for column in named.schema.columns() {
                expanded.push(if named.relation.is_empty() {
                    ColumnRef::new(column.name.clone())
                } else {
                    ColumnRef::qualified(named.relation.clone(), column.name.clone())
                });
            }
        }

        AllExpr {
            relation: all.relation.clone(),
            expanded,
        }
    }

    /// Grouping keys of the nearest grouped operator under `id`.
    fn group_keys_of(&self, id: NodeId) -> Vec<Expr> {
        let mut current = id;
        loop {
            let node = self.nodes.get(current);
            match node.op() {
                PhysicalOp::GroupBy(group) => return group.groups.clone(),
                PhysicalOp::DataProvider(DataProvider {
                    provider_type: ProviderType::Partition { keys, .. },
                    ..
                }) => return keys.clone(),
                _ => {}
            }
            match node.producer(0) {
                Some(next) if node.output_type() == SchemaType::Group => current = next,
                _ => return Vec::new(),
            }
        }
    }

    fn gen_fn_def(&mut self, def: &FnDef) -> PlanResult<()> {
        self.codegen.compile_function(def).map_err(|e| {
            fail(PlanError::OpGen(format!("{}: {}", def.name, e)))
        })
    }

    fn compile_exprs(
        &mut self,
        inputs: &[NamedSchema],
        exprs: &[(String, Expr)],
        row_mode: bool,
    ) -> PlanResult<FnInfo> {
        self.codegen
            .compile(inputs, exprs, row_mode)
            .map_err(|e| fail(PlanError::from(e)))
    }

    /// Compile an expression list for an operator descriptor.
    fn gen_exprs(&mut self, inputs: &[NamedSchema], exprs: &[Expr]) -> PlanResult<FnInfo> {
        let named: Vec<(String, Expr)> = exprs.iter().map(|e| (e.to_string(), e.clone())).collect();
        self.compile_exprs(inputs, &named, true)
    }

    /// Attach compiled functions to every operator under `root`, producers
    /// first. Descriptors that already carry a function are left alone.
    pub fn gen_plan_node(&mut self, root: NodeId) -> PlanResult<()> {
        let mut visited = HashSet::new();
        self.gen_node(root, &mut visited)
    }

    fn gen_node(&mut self, id: NodeId, visited: &mut HashSet<NodeId>) -> PlanResult<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let producers = self.nodes.get(id).producers().to_vec();
        for &producer in &producers {
            self.gen_node(producer, visited)?;
        }

        let input = |idx: usize| -> Vec<NamedSchema> {
            producers
                .get(idx)
                .map(|&p| self.nodes.get(p).output_schemas().to_vec())
                .unwrap_or_default()
        };
        let (left, right) = (input(0), input(1));
        let own = self.nodes.get(id).output_schemas().to_vec();

        let mut op = self.nodes.get(id).op().clone();
        let changed = match &mut op {
            PhysicalOp::GroupBy(group) => self.gen_group(group, &left)?,
            PhysicalOp::SortBy(sort) => self.gen_sort(sort, &left)?,
            PhysicalOp::Filter(filter) => self.gen_filter(filter, &left)?,
            PhysicalOp::Project(project) => match project.window.as_mut() {
                Some(window) if project.project_type == ProjectType::WindowAggregation => {
                    self.gen_window(window, &left)?
                }
                _ => false,
            },
            PhysicalOp::Join(join) | PhysicalOp::RequestJoin(join) => {
                let filter = self.gen_filter(&mut join.filter, &own)?;
                let hash = self.gen_hash(&mut join.left_hash, &left)?;
                let partition = self.gen_group(&mut join.right_partition, &right)?;
                filter || hash || partition
            }
            PhysicalOp::RequestUnion(window) => self.gen_window(window, &right)?,
            _ => false,
        };
        if changed {
            self.nodes.set_op(id, op);
        }
        Ok(())
    }

    fn gen_group(&mut self, group: &mut Group, inputs: &[NamedSchema]) -> PlanResult<bool> {
        if group.groups.is_empty() || !group.fn_info.is_empty() {
            return Ok(false);
        }
        group.fn_info = self.gen_exprs(inputs, &group.groups)?;
        group.idxs = (0..group.groups.len()).collect();
        Ok(true)
    }

    fn gen_sort(&mut self, sort: &mut Sort, inputs: &[NamedSchema]) -> PlanResult<bool> {
        if sort.exprs().is_empty() || !sort.fn_info.is_empty() {
            return Ok(false);
        }
        let exprs = sort.exprs().to_vec();
        sort.fn_info = self.gen_exprs(inputs, &exprs)?;
        sort.idxs = (0..exprs.len()).collect();
        Ok(true)
    }

    fn gen_hash(&mut self, hash: &mut Hash, inputs: &[NamedSchema]) -> PlanResult<bool> {
        if hash.keys.is_empty() || !hash.fn_info.is_empty() {
            return Ok(false);
        }
        hash.fn_info = self.gen_exprs(inputs, &hash.keys)?;
        hash.idxs = (0..hash.keys.len()).collect();
        Ok(true)
    }

    fn gen_filter(&mut self, filter: &mut ConditionFilter, inputs: &[NamedSchema]) -> PlanResult<bool> {
        let Some(condition) = filter.condition.clone() else {
            return Ok(false);
        };
        if !filter.fn_info.is_empty() {
            return Ok(false);
        }
        filter.fn_info = self.gen_exprs(inputs, &[condition])?;
        filter.idxs = vec![0];
        Ok(true)
    }

    fn gen_window(&mut self, window: &mut WindowOp, inputs: &[NamedSchema]) -> PlanResult<bool> {
        let group = self.gen_group(&mut window.group, inputs)?;
        let sort = self.gen_sort(&mut window.sort, inputs)?;
        let hash = self.gen_hash(&mut window.hash, inputs)?;
        Ok(group || sort || hash)
    }
}

fn fail(err: PlanError) -> PlanError {
    warn!(error = %err, code = ?err.code(), "plan transformation failed");
    err
}

/// Every column of `exprs` belongs to the first input of `ctx`.
fn from_left(ctx: &SchemasContext<'_>, exprs: &[Expr]) -> bool {
    matches!(
        ctx.resolve_exprs(exprs),
        ExprSource::Constant | ExprSource::Input(0)
    )
}

fn check_pos_mapping(lists: &[ProjectList], pos_mapping: &[(usize, usize)]) -> PlanResult<()> {
    if pos_mapping.is_empty() {
        return Err(fail(PlanError::InvalidPlan(
            "multiple project lists need a position mapping".into(),
        )));
    }
    for &(list_idx, item_idx) in pos_mapping {
        let valid = lists
            .get(list_idx)
            .is_some_and(|list| item_idx < list.projects.len());
        if !valid {
            return Err(fail(PlanError::InvalidPlan(format!(
                "position mapping ({}, {}) out of range",
                list_idx, item_idx
            ))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType, MemoryCatalog, TableDef};
    use crate::codegen::SchemaCodeGenerator;
    use crate::planner::error::ErrorCode;
    use crate::planner::optimizer::PassType;
    use crate::sql::{BinaryOperator, OrderBy};

    fn catalog() -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        let t1 = TableDef::builder("t1")
            .add_column("col1", DataType::Int32)
            .add_column("col2", DataType::String)
            .add_column("col3", DataType::Int64)
            .add_column("ts", DataType::Timestamp)
            .add_index("index1", &["col2"], Some("ts"))
            .build()
            .unwrap();
        let t2 = TableDef::builder("t2")
            .add_column("col1", DataType::Int32)
            .add_column("col5", DataType::Double)
            .add_column("ts", DataType::Timestamp)
            .add_index("index2", &["col1"], Some("ts"))
            .build()
            .unwrap();
        catalog.add_table("db", t1).unwrap();
        catalog.add_table("db", t2).unwrap();
        Arc::new(catalog)
    }

    fn transformer(config: TransformerConfig) -> Transformer {
        Transformer::new(config, catalog(), Box::new(SchemaCodeGenerator::new()))
    }

    fn batch() -> Transformer {
        transformer(TransformerConfig::new("db").without_passes())
    }

    fn request() -> Transformer {
        transformer(
            TransformerConfig::new("db")
                .mode(TransformMode::Request)
                .without_passes(),
        )
    }

    fn window_by_col2() -> WindowSpec {
        WindowSpec::new(
            vec![Expr::column("col2")],
            Some(OrderBy::new(vec![Expr::column("ts")], true)),
        )
    }

    fn project_of(t: &Transformer, id: NodeId) -> Project {
        match t.nodes().get(id).op() {
            PhysicalOp::Project(project) => project.clone(),
            other => panic!("expected project, got {}", other.type_name()),
        }
    }

    /// Operator names along the first-producer chain starting at `id`.
    fn chain(t: &Transformer, id: NodeId) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            names.push(t.nodes().get(node).op().type_name());
            current = t.nodes().get(node).producer(0);
        }
        names
    }

    #[test]
    fn test_structural_copy_without_passes() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let filter = plan.filter(scan, Expr::column("col1").gt(Expr::int(1)));
        let sort = plan.sort(filter, OrderBy::new(vec![Expr::column("col3")], true));
        let distinct = plan.distinct(sort);
        let rename = plan.rename(distinct, "r");
        let limit = plan.limit(rename, 5);
        let query = plan.query(limit);

        let mut t = batch();
        let root = t.transform_plan_op(&plan, query).unwrap();
        assert_eq!(
            chain(&t, root),
            vec!["LIMIT", "RENAME", "DISTINCT", "SORT_BY", "FILTER", "DATA_PROVIDER"]
        );
        assert_eq!(t.nodes().get(root).limit_cnt(), Some(5));

        let root_node = t.nodes().get(root);
        assert_eq!(root_node.output_schemas().len(), 1);
        assert_eq!(root_node.output_schemas()[0].relation, "r");
        assert_eq!(
            root_node.output_schema().column_names(),
            vec!["col1", "col2", "col3", "ts"]
        );
        assert_eq!(root_node.output_type(), SchemaType::Table);
    }

    #[test]
    fn test_shared_logical_node_lowered_once() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let filter = plan.filter(scan, Expr::column("col1").gt(Expr::int(1)));
        let union = plan.union(filter, filter, true);
        let query = plan.query(union);

        let mut t = batch();
        let root = t.transform_plan_op(&plan, query).unwrap();
        let producers = t.nodes().get(root).producers();
        assert_eq!(producers.len(), 2);
        assert_eq!(producers[0], producers[1]);
        assert_eq!(t.nodes().len(), 3);
    }

    #[test]
    fn test_unknown_table() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("missing");
        let query = plan.query(scan);

        let err = batch().transform_plan_op(&plan, query).unwrap_err();
        assert!(matches!(&err, PlanError::TableNotFound { table, .. } if table == "missing"));
        assert_eq!(err.code(), ErrorCode::Plan);
    }

    #[test]
    fn test_max_depth() {
        let mut plan = LogicalPlan::new();
        let mut id = plan.table("t1");
        for _ in 0..3 {
            id = plan.filter(id, Expr::column("col1").gt(Expr::int(1)));
        }
        let query = plan.query(id);

        let mut t = transformer(TransformerConfig::new("db").without_passes().max_depth(3));
        let err = t.transform_plan_op(&plan, query).unwrap_err();
        assert!(matches!(err, PlanError::TooDeep(3)));

        let mut t = transformer(TransformerConfig::new("db").without_passes().max_depth(5));
        assert!(t.transform_plan_op(&plan, query).is_ok());
    }

    #[test]
    fn test_dangling_plan_id() {
        let plan: LogicalPlan =
            serde_json::from_str(r#"{"nodes": [{"op": "query", "input": 4}]}"#).unwrap();
        let query = plan.last().unwrap();
        let err = batch().transform_plan_op(&plan, query).unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));
    }

    #[test]
    fn test_top_level_trees_checked() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let filter = plan.filter(scan, Expr::column("col1").gt(Expr::int(1)));

        let mut t = batch();
        let err = t.transform_physical_plan(&plan, &[]).unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));

        let err = t.transform_physical_plan(&plan, &[filter]).unwrap_err();
        assert!(matches!(err, PlanError::Unsupported(_)));
    }

    #[test]
    fn test_batch_project_types() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let table_project = plan.project(scan, ProjectList::new().push("col1", Expr::column("col1")));
        let group = plan.group(scan, vec![Expr::column("col2")]);
        let group_project = plan.project(
            group,
            ProjectList::new()
                .push("col2", Expr::column("col2"))
                .push("cnt", Expr::function("count", vec![Expr::all()])),
        );
        let window_project = plan.project(
            scan,
            ProjectList::new()
                .push("w_sum", Expr::function("sum", vec![Expr::column("col3")]))
                .over(window_by_col2()),
        );

        let mut t = batch();
        let id = t.transform_plan_op(&plan, table_project).unwrap();
        assert_eq!(project_of(&t, id).project_type, ProjectType::Table);

        let id = t.transform_plan_op(&plan, group_project).unwrap();
        let project = project_of(&t, id);
        assert_eq!(project.project_type, ProjectType::GroupAggregation);
        assert_eq!(project.group.unwrap().groups, vec![Expr::column("col2")]);
        assert_eq!(
            t.nodes().get(id).output_schema().column_names(),
            vec!["col2", "cnt"]
        );

        let id = t.transform_plan_op(&plan, window_project).unwrap();
        let project = project_of(&t, id);
        assert_eq!(project.project_type, ProjectType::WindowAggregation);
        let window = project.window.unwrap();
        assert_eq!(window.group.groups, vec![Expr::column("col2")]);
        assert_eq!(window.sort.exprs(), &[Expr::column("ts")]);
    }

    #[test]
    fn test_aggregate_in_row_project_rejected() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let project = plan.project(
            scan,
            ProjectList::new().push("s", Expr::function("sum", vec![Expr::column("col3")])),
        );

        let err = batch().transform_plan_op(&plan, project).unwrap_err();
        assert!(matches!(err, PlanError::Codegen(_)));
        assert_eq!(err.code(), ErrorCode::Codegen);
    }

    #[test]
    fn test_wildcard_expanded_against_input() {
        let mut plan = LogicalPlan::new();
        let left = plan.table("t1");
        let right = plan.table("t2");
        let join = plan.join(left, right, JoinType::Inner, None);
        let mut list = ProjectList::new();
        list.add_project("t2.*", Expr::All(AllExpr {
            relation: Some("t2".into()),
            expanded: Vec::new(),
        }));
        let project = plan.project(join, list);

        let mut t = batch();
        let id = t.transform_plan_op(&plan, project).unwrap();
        assert_eq!(
            t.nodes().get(id).output_schema().column_names(),
            vec!["col1", "col5", "ts"]
        );
    }

    #[test]
    fn test_request_scan() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let other = plan.table("t2");

        let mut t = request();
        let id = t.transform_plan_op(&plan, primary).unwrap();
        assert!(t.nodes().get(id).is_request_provider());
        assert_eq!(t.nodes().get(id).output_type(), SchemaType::Row);
        assert_eq!(t.request_name(), Some("t1"));
        assert_eq!(t.request_schema().map(|s| s.len()), Some(4));

        let id = t.transform_plan_op(&plan, other).unwrap();
        assert!(t.nodes().get(id).is_table_provider());

        // The primary flag means nothing in batch mode.
        let mut t = batch();
        let id = t.transform_plan_op(&plan, primary).unwrap();
        assert!(t.nodes().get(id).is_table_provider());
        assert_eq!(t.request_name(), None);
    }

    #[test]
    fn test_request_window_project() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let project = plan.project(
            primary,
            ProjectList::new()
                .push("w_sum", Expr::function("sum", vec![Expr::column("col3")]))
                .over(window_by_col2()),
        );

        let mut t = request();
        let id = t.transform_plan_op(&plan, project).unwrap();
        assert_eq!(project_of(&t, id).project_type, ProjectType::Aggregation);
        assert_eq!(t.nodes().get(id).output_type(), SchemaType::Row);

        let union = t.nodes().get(id).producers()[0];
        let PhysicalOp::RequestUnion(window) = t.nodes().get(union).op() else {
            panic!("expected request union");
        };
        assert_eq!(window.group.groups, vec![Expr::column("col2")]);
        let producers = t.nodes().get(union).producers();
        assert!(t.nodes().get(producers[0]).is_request_provider());
        assert!(t.nodes().get(producers[1]).is_table_provider());
        assert_eq!(t.nodes().get(union).output_type(), SchemaType::Table);
    }

    #[test]
    fn test_request_group_and_sort_become_unions() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let group = plan.group(primary, vec![Expr::column("col2")]);
        let sort = plan.sort(primary, OrderBy::new(vec![Expr::column("ts")], false));

        let mut t = request();
        let id = t.transform_plan_op(&plan, group).unwrap();
        let PhysicalOp::RequestUnion(window) = t.nodes().get(id).op() else {
            panic!("expected request union");
        };
        assert_eq!(window.group.groups, vec![Expr::column("col2")]);
        assert_eq!(window.start_offset, UNBOUNDED);

        let id = t.transform_plan_op(&plan, sort).unwrap();
        let PhysicalOp::RequestUnion(window) = t.nodes().get(id).op() else {
            panic!("expected request union");
        };
        assert!(window.group.is_empty());
        assert_eq!(window.sort.exprs(), &[Expr::column("ts")]);
    }

    fn request_join_window(keys: Vec<Expr>) -> (LogicalPlan, PlanId) {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let right = plan.table("t2");
        let join = plan.join(
            primary,
            right,
            JoinType::Last,
            Some(Expr::qualified("t1", "col1").eq(Expr::qualified("t2", "col1"))),
        );
        let window = WindowSpec::new(
            keys,
            Some(OrderBy::new(vec![Expr::qualified("t1", "ts")], true)),
        );
        let project = plan.project(
            join,
            ProjectList::new()
                .push("w_sum", Expr::function("sum", vec![Expr::qualified("t1", "col3")]))
                .over(window),
        );
        (plan, project)
    }

    #[test]
    fn test_request_join_window_on_left_keys() {
        let (plan, project) = request_join_window(vec![Expr::qualified("t1", "col2")]);

        let mut t = request();
        let id = t.transform_plan_op(&plan, project).unwrap();
        assert_eq!(project_of(&t, id).project_type, ProjectType::Aggregation);

        let join = t.nodes().get(id).producers()[0];
        let join_node = t.nodes().get(join);
        assert!(matches!(join_node.op(), PhysicalOp::Join(j) if j.join_type == JoinType::Last));
        let union = join_node.producers()[0];
        let right = join_node.producers()[1];
        assert!(matches!(t.nodes().get(union).op(), PhysicalOp::RequestUnion(_)));
        assert!(t.nodes().get(right).is_table_provider());
        assert_eq!(
            join_node.output_schemas().iter().map(|s| s.relation.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn test_request_join_window_on_right_key_rejected() {
        let (plan, project) = request_join_window(vec![Expr::qualified("t2", "col5")]);
        let err = request().transform_plan_op(&plan, project).unwrap_err();
        assert!(matches!(err, PlanError::Window(_)));
    }

    #[test]
    fn test_batch_multi_project() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let plain = ProjectList::new()
            .push("col1", Expr::column("col1"))
            .push("col2", Expr::column("col2"));
        let windowed = ProjectList::new()
            .push("w_sum", Expr::function("sum", vec![Expr::column("col3")]))
            .over(window_by_col2());
        let project = plan.multi_project(scan, vec![plain, windowed], vec![(0, 0), (1, 0), (0, 1)]);

        let mut t = batch();
        let id = t.transform_plan_op(&plan, project).unwrap();
        assert_eq!(project_of(&t, id).project_type, ProjectType::Table);
        assert_eq!(
            t.nodes().get(id).output_schema().column_names(),
            vec!["col1", "w_sum", "col2"]
        );

        let below = t.nodes().get(id).producers()[0];
        assert_eq!(project_of(&t, below).project_type, ProjectType::WindowAggregation);
        assert_eq!(
            t.nodes().get(below).output_schema().column_names(),
            vec!["w_sum", "col1", "col2", "col3", "ts"]
        );
    }

    #[test]
    fn test_request_multi_project() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let plain = ProjectList::new().push("col1", Expr::column("col1"));
        let windowed = ProjectList::new()
            .push("total", Expr::function("sum", vec![Expr::column("col3")]))
            .over(window_by_col2());
        let project = plan.multi_project(primary, vec![plain, windowed], vec![(0, 0), (1, 0)]);

        let mut t = request();
        let id = t.transform_plan_op(&plan, project).unwrap();
        assert_eq!(project_of(&t, id).project_type, ProjectType::Row);
        assert_eq!(
            t.nodes().get(id).output_schema().column_names(),
            vec!["col1", "total"]
        );

        let concat = t.nodes().get(id).producers()[0];
        let concat_node = t.nodes().get(concat);
        assert!(matches!(
            concat_node.op(),
            PhysicalOp::RequestJoin(j) if j.join_type == JoinType::Concat
        ));
        let first = concat_node.producers()[0];
        let second = concat_node.producers()[1];
        assert_eq!(project_of(&t, first).project_type, ProjectType::Row);
        assert_eq!(project_of(&t, second).project_type, ProjectType::Aggregation);
    }

    #[test]
    fn test_request_multi_project_with_wildcard() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let mut all = ProjectList::new();
        all.add_wildcard();
        let windowed = ProjectList::new()
            .push("total", Expr::function("sum", vec![Expr::column("col3")]))
            .over(window_by_col2());
        let project = plan.multi_project(primary, vec![all, windowed], vec![(0, 0), (1, 0)]);
        let query = plan.query(project);

        let mut t = request();
        let root = t.transform_physical_plan(&plan, &[query]).unwrap().unwrap();
        assert_eq!(project_of(&t, root).project_type, ProjectType::Row);
        assert_eq!(
            t.nodes().get(root).output_schema().column_names(),
            vec!["col1", "col2", "col3", "ts", "total"]
        );
    }

    #[test]
    fn test_request_table_reset_between_calls() {
        let mut plan = LogicalPlan::new();
        let primary = plan.primary_table("t1");
        let first = plan.query(primary);
        let other = plan.table("t2");
        let second = plan.query(other);

        let mut t = request();
        t.transform_physical_plan(&plan, &[first]).unwrap();
        assert_eq!(t.request_name(), Some("t1"));

        t.transform_physical_plan(&plan, &[second]).unwrap();
        assert_eq!(t.request_name(), None);
        assert!(t.request_schema().is_none());
    }

    #[test]
    fn test_multi_project_mapping_checked() {
        let mut plan = LogicalPlan::new();
        let scan = plan.table("t1");
        let lists = vec![
            ProjectList::new().push("col1", Expr::column("col1")),
            ProjectList::new().push("col2", Expr::column("col2")),
        ];
        let out_of_range = plan.multi_project(scan, lists.clone(), vec![(0, 3)]);
        let missing = plan.multi_project(scan, lists, Vec::new());
        let empty = plan.multi_project(scan, Vec::new(), Vec::new());

        let mut t = batch();
        for id in [out_of_range, missing, empty] {
            let err = t.transform_plan_op(&plan, id).unwrap_err();
            assert!(matches!(err, PlanError::InvalidPlan(_)));
        }
    }

    #[test]
    fn test_codegen_attached_to_operators() {
        let mut plan = LogicalPlan::new();
        let left = plan.table("t1");
        let filter = plan.filter(left, Expr::column("col1").gt(Expr::int(1)));
        let right = plan.table("t2");
        let condition = Expr::qualified("t1", "col1")
            .eq(Expr::qualified("t2", "col1"))
            .and(Expr::qualified("t2", "col5").gt(Expr::int(0)));
        let join = plan.join(filter, right, JoinType::Inner, Some(condition));
        let query = plan.query(join);

        let config = TransformerConfig::new("db").passes(vec![PassType::ConditionOptimized]);
        let mut t = transformer(config);
        let root = t.transform_physical_plan(&plan, &[query]).unwrap().unwrap();

        let PhysicalOp::Join(join) = t.nodes().get(root).op().clone() else {
            panic!("expected join");
        };
        assert_eq!(join.left_hash.keys, vec![Expr::qualified("t1", "col1")]);
        assert_eq!(join.left_hash.idxs, vec![0]);
        assert!(join.left_hash.fn_info.fn_name.starts_with("__internal_sql_codegen_"));
        assert!(!join.right_partition.fn_info.is_empty());
        assert!(!join.filter.fn_info.is_empty());

        let filter = t.nodes().get(root).producers()[0];
        let PhysicalOp::Filter(condition) = t.nodes().get(filter).op() else {
            panic!("expected filter");
        };
        assert!(!condition.fn_info.is_empty());

        // A second pass leaves existing functions alone.
        t.gen_plan_node(root).unwrap();
        assert!(matches!(
            t.nodes().get(root).op(),
            PhysicalOp::Join(j) if j.left_hash.fn_info == join.left_hash.fn_info
        ));
    }

    #[test]
    fn test_function_definitions() {
        let def = FnDef {
            name: "add_one".into(),
            args: vec![ColumnDef::new("x", DataType::Int64)],
            return_type: DataType::Int64,
            body: Expr::binary(Expr::column("x"), BinaryOperator::Plus, Expr::int(1)),
        };
        let mut plan = LogicalPlan::new();
        let fn_def = plan.func_def(def);
        let scan = plan.table("t1");
        let project = plan.project(
            scan,
            ProjectList::new().push("next", Expr::function("add_one", vec![Expr::column("col3")])),
        );
        let query = plan.query(project);

        let mut t = batch();
        let root = t.transform_physical_plan(&plan, &[fn_def, query]).unwrap();
        assert!(root.is_some());

        let err = batch()
            .transform_physical_plan(&plan, &[fn_def, fn_def])
            .unwrap_err();
        assert!(matches!(err, PlanError::OpGen(_)));
        assert_eq!(err.code(), ErrorCode::OpGen);

        let only_defs = batch().transform_physical_plan(&plan, &[fn_def]).unwrap();
        assert!(only_defs.is_none());
    }
}
