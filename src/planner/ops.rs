//! Operator descriptors attached to physical nodes.
//!
//! Each descriptor keeps its expressions uncompiled until code generation
//! fills in the [`FnInfo`] and the input indices.

use std::sync::Arc;

use crate::catalog::TableHandle;
use crate::codegen::FnInfo;
use crate::sql::{Expr, OrderBy, WindowSpec};

use super::logical::{JoinType, ProjectItem};

/// Grouping keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub groups: Vec<Expr>,
    pub idxs: Vec<usize>,
    pub fn_info: FnInfo,
}

impl Group {
    pub fn new(groups: Vec<Expr>) -> Self {
        Self {
            groups,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Ordering keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    pub orders: Option<OrderBy>,
    pub idxs: Vec<usize>,
    pub fn_info: FnInfo,
}

impl Sort {
    pub fn new(orders: Option<OrderBy>) -> Self {
        Self {
            orders,
            ..Self::default()
        }
    }

    pub fn exprs(&self) -> &[Expr] {
        self.orders.as_ref().map(|o| o.exprs.as_slice()).unwrap_or(&[])
    }
}

/// Hash keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hash {
    pub keys: Vec<Expr>,
    pub idxs: Vec<usize>,
    pub fn_info: FnInfo,
}

impl Hash {
    pub fn new(keys: Vec<Expr>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }
}

/// Boolean filter condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionFilter {
    pub condition: Option<Expr>,
    pub idxs: Vec<usize>,
    pub fn_info: FnInfo,
}

impl ConditionFilter {
    pub fn new(condition: Option<Expr>) -> Self {
        Self {
            condition,
            ..Self::default()
        }
    }
}

/// Join descriptor shared by batch and request joins.
///
/// `left_hash` and `right_partition` hold the equi-join keys once the
/// condition pass has pulled them out of `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub filter: ConditionFilter,
    pub left_hash: Hash,
    pub right_partition: Group,
}

impl Join {
    pub fn new(join_type: JoinType, condition: Option<Expr>) -> Self {
        Self {
            join_type,
            filter: ConditionFilter::new(condition),
            left_hash: Hash::default(),
            right_partition: Group::default(),
        }
    }

    pub fn is_left_or_last(&self) -> bool {
        matches!(self.join_type, JoinType::Left | JoinType::Last)
    }
}

/// Window descriptor of a window aggregation or request union.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOp {
    pub group: Group,
    pub sort: Sort,
    pub hash: Hash,
    pub start_offset: i64,
    pub end_offset: i64,
}

impl WindowOp {
    pub fn new(group: Group, sort: Sort, start_offset: i64, end_offset: i64) -> Self {
        Self {
            group,
            sort,
            hash: Hash::default(),
            start_offset,
            end_offset,
        }
    }
}

impl From<&WindowSpec> for WindowOp {
    fn from(spec: &WindowSpec) -> Self {
        WindowOp::new(
            Group::new(spec.keys.clone()),
            Sort::new(spec.orders.clone()),
            spec.start_offset,
            spec.end_offset,
        )
    }
}

/// How a data provider reads its table.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderType {
    Table,
    /// Scan through an index, partitioned by `keys`.
    Partition { index_name: String, keys: Vec<Expr> },
    /// The single request row.
    Request,
}

/// Leaf reading rows of a catalog table.
#[derive(Debug, Clone)]
pub struct DataProvider {
    pub table: Arc<dyn TableHandle>,
    pub provider_type: ProviderType,
}

impl DataProvider {
    pub fn table(table: Arc<dyn TableHandle>) -> Self {
        Self {
            table,
            provider_type: ProviderType::Table,
        }
    }

    pub fn partition(table: Arc<dyn TableHandle>, index_name: String, keys: Vec<Expr>) -> Self {
        Self {
            table,
            provider_type: ProviderType::Partition { index_name, keys },
        }
    }

    pub fn request(table: Arc<dyn TableHandle>) -> Self {
        Self {
            table,
            provider_type: ProviderType::Request,
        }
    }

    pub fn is_request(&self) -> bool {
        self.provider_type == ProviderType::Request
    }

    pub fn is_table(&self) -> bool {
        self.provider_type == ProviderType::Table
    }
}

/// Flavor of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Row,
    Table,
    Aggregation,
    GroupAggregation,
    WindowAggregation,
}

impl ProjectType {
    /// Evaluated once per input row rather than over a group or window.
    pub fn is_row_mode(self) -> bool {
        matches!(self, ProjectType::Row | ProjectType::Table)
    }
}

/// Compiled projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub project_type: ProjectType,
    pub projects: Vec<ProjectItem>,
    pub fn_info: FnInfo,
    /// Grouping keys of a group aggregation.
    pub group: Option<Group>,
    /// Window of a window aggregation.
    pub window: Option<WindowOp>,
}
