//! Expression AST shared by logical and physical plans.
//!
//! The logical planner hands expressions to the transformer in this form;
//! physical operator specs keep them uncompiled until code generation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnDef, DataType};

/// Column reference with an optional relation qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            relation: None,
            column: column.into(),
        }
    }

    pub fn qualified(relation: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) if !relation.is_empty() => write!(f, "{}.{}", relation, self.column),
            _ => write!(f, "{}", self.column),
        }
    }
}

/// SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column reference.
    Column(ColumnRef),
    /// Literal value.
    Literal(LiteralValue),
    /// Binary operation (e.g., a = b, a AND b).
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation (e.g., NOT a, -x).
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// Nested expression in parentheses.
    Nested(Box<Expr>),
    /// Function call, aggregates included.
    Function { name: String, args: Vec<Expr> },
    /// `*` or `t.*`.
    All(AllExpr),
}

/// Wildcard projection.
///
/// `expanded` stays empty until the transformer replaces the wildcard with
/// explicit column references drawn from the upstream schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expanded: Vec<ColumnRef>,
}

impl AllExpr {
    pub fn is_expanded(&self) -> bool {
        !self.expanded.is_empty()
    }
}

/// Literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => write!(f, "NULL"),
            LiteralValue::Boolean(b) => write!(f, "{}", b),
            LiteralValue::Integer(n) => write!(f, "{}", n),
            LiteralValue::Float(x) => write!(f, "{}", x),
            LiteralValue::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Concat,
}

impl BinaryOperator {
    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Check if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Concat => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

impl Expr {
    /// Unqualified column reference.
    pub fn column(column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(column))
    }

    /// Qualified column reference `relation.column`.
    pub fn qualified(relation: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::qualified(relation, column))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(LiteralValue::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(LiteralValue::String(value.into()))
    }

    /// Unexpanded `*`.
    pub fn all() -> Self {
        Expr::All(AllExpr::default())
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOperator::Eq, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOperator::Gt, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOperator::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::binary(self, BinaryOperator::Or, other)
    }

    pub fn nested(self) -> Self {
        Expr::Nested(Box::new(self))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// The column reference, if this expression is exactly one.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(col) => Some(col),
            _ => None,
        }
    }

    /// All column references in evaluation order, wildcard expansions included.
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.collect_column_refs(&mut refs);
        refs
    }

    fn collect_column_refs<'a>(&'a self, refs: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(col) => refs.push(col),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_column_refs(refs);
                right.collect_column_refs(refs);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => expr.collect_column_refs(refs),
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_column_refs(refs);
                }
            }
            Expr::All(all) => refs.extend(all.expanded.iter()),
        }
    }

    /// Whether this expression calls an aggregate function anywhere.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args } => {
                is_aggregate_function(name) || args.iter().any(|a| a.has_aggregate())
            }
            Expr::BinaryOp { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => expr.has_aggregate(),
            Expr::Column(_) | Expr::Literal(_) | Expr::All(_) => false,
        }
    }
}

/// Names of the aggregate functions known to the planner.
pub fn is_aggregate_function(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "count" | "sum" | "avg" | "min" | "max"
    )
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT {}", expr),
                UnaryOperator::Minus => write!(f, "-{}", expr),
                UnaryOperator::Plus => write!(f, "+{}", expr),
            },
            Expr::Nested(expr) => write!(f, "({})", expr),
            Expr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Expr::All(all) => match &all.relation {
                Some(relation) if !relation.is_empty() => write!(f, "{}.*", relation),
                _ => write!(f, "*"),
            },
        }
    }
}

/// ORDER BY clause of a sort or window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub exprs: Vec<Expr>,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl OrderBy {
    pub fn new(exprs: Vec<Expr>, ascending: bool) -> Self {
        Self { exprs, ascending }
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        write!(
            f,
            "{} {}",
            exprs.join(", "),
            if self.ascending { "ASC" } else { "DESC" }
        )
    }
}

/// Frame offset meaning "unbounded".
pub const UNBOUNDED: i64 = -1;

/// Window definition of an `OVER` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default)]
    pub keys: Vec<Expr>,
    #[serde(default)]
    pub orders: Option<OrderBy>,
    #[serde(default = "unbounded")]
    pub start_offset: i64,
    #[serde(default = "unbounded")]
    pub end_offset: i64,
}

fn unbounded() -> i64 {
    UNBOUNDED
}

impl WindowSpec {
    pub fn new(keys: Vec<Expr>, orders: Option<OrderBy>) -> Self {
        Self {
            keys,
            orders,
            start_offset: UNBOUNDED,
            end_offset: UNBOUNDED,
        }
    }

    pub fn with_frame(mut self, start_offset: i64, end_offset: i64) -> Self {
        self.start_offset = start_offset;
        self.end_offset = end_offset;
        self
    }
}

/// User-defined scalar function, compiled directly by the code generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDef {
    pub name: String,
    pub args: Vec<ColumnDef>,
    pub return_type: DataType,
    pub body: Expr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_display() {
        let expr = Expr::qualified("t1", "a")
            .eq(Expr::qualified("t2", "b"))
            .and(Expr::column("c").gt(Expr::int(5)).nested());
        assert_eq!(expr.to_string(), "t1.a = t2.b AND (c > 5)");
    }

    #[test]
    fn test_column_refs_in_order() {
        let expr = Expr::function(
            "sum",
            vec![Expr::binary(
                Expr::column("x"),
                BinaryOperator::Plus,
                Expr::qualified("t", "y"),
            )],
        );
        let refs: Vec<String> = expr.column_refs().iter().map(|c| c.to_string()).collect();
        assert_eq!(refs, vec!["x", "t.y"]);
        assert!(expr.has_aggregate());
    }

    #[test]
    fn test_expr_json_shape() {
        let expr = Expr::column("a").eq(Expr::int(1));
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
