//! Conjunct splitting and equi-join key extraction.

use crate::catalog::NamedSchema;
use crate::sql::{BinaryOperator, Expr};

use super::schemas::{ExprSource, SchemasContext};

/// Split a condition on `AND`, looking through parentheses.
///
/// Every other operator, `OR` included, is returned as one conjunct.
pub fn split_conjunction(expr: &Expr) -> Vec<&Expr> {
    let mut conjuncts = Vec::new();
    collect_conjuncts(expr, &mut conjuncts);
    conjuncts
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Nested(inner) => collect_conjuncts(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        _ => out.push(expr),
    }
}

/// AND a list of conditions together, left to right.
pub fn conjunction(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(|acc, e| acc.and(e))
}

fn as_equality(expr: &Expr) -> Option<(&Expr, &Expr)> {
    match expr {
        Expr::Nested(inner) => as_equality(inner),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => Some((left.as_ref(), right.as_ref())),
        _ => None,
    }
}

/// A join condition split into key pairs and the remaining filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquiJoinSplit {
    pub left_keys: Vec<Expr>,
    pub right_keys: Vec<Expr>,
    pub residual: Option<Expr>,
}

/// Pull `left = right` conjuncts out of a join condition.
///
/// `schemas` is the join's output name-schema list; entries before
/// `left_len` belong to the left input. An equality qualifies when one side
/// resolves entirely to the left input and the other to the right input.
pub fn split_join_condition(condition: &Expr, schemas: &[NamedSchema], left_len: usize) -> EquiJoinSplit {
    let ctx = SchemasContext::new(schemas);
    let mut split = EquiJoinSplit::default();
    let mut residual = Vec::new();

    for conjunct in split_conjunction(condition) {
        let pair = as_equality(conjunct).and_then(|(lhs, rhs)| {
            match (ctx.resolve_expr(lhs), ctx.resolve_expr(rhs)) {
                (ExprSource::Input(a), ExprSource::Input(b)) if a < left_len && b >= left_len => {
                    Some((lhs, rhs))
                }
                (ExprSource::Input(a), ExprSource::Input(b)) if b < left_len && a >= left_len => {
                    Some((rhs, lhs))
                }
                _ => None,
            }
        });
        match pair {
            Some((left, right)) => {
                split.left_keys.push(left.clone());
                split.right_keys.push(right.clone());
            }
            None => residual.push(conjunct.clone()),
        }
    }

    split.residual = conjunction(residual);
    split
}
