//! Matching grouping keys and orders against table indexes.

use std::collections::{BTreeSet, HashMap};

use crate::catalog::IndexHint;
use crate::sql::{Expr, OrderBy};

/// Name of the index best covering `columns`.
///
/// An index whose key set equals the column set wins outright. Otherwise each
/// column is dropped in turn and the subset search recurses; among the
/// candidates the index with the most keys wins, the first one found on ties.
/// Indexes are visited in name order, columns in the given order.
pub fn match_best_index(columns: &[String], hint: &IndexHint) -> Option<String> {
    let mut unique: Vec<&str> = Vec::new();
    for column in columns {
        if !unique.contains(&column.as_str()) {
            unique.push(column);
        }
    }
    let mut bitmap = vec![true; unique.len()];
    let mut memo = HashMap::new();
    match_subset(&unique, hint, &mut bitmap, &mut memo)
}

fn match_subset(
    columns: &[&str],
    hint: &IndexHint,
    bitmap: &mut Vec<bool>,
    memo: &mut HashMap<Vec<bool>, Option<String>>,
) -> Option<String> {
    if let Some(found) = memo.get(bitmap.as_slice()) {
        return found.clone();
    }

    let column_set: BTreeSet<&str> = columns
        .iter()
        .zip(bitmap.iter())
        .filter_map(|(column, on)| on.then_some(*column))
        .collect();
    if column_set.is_empty() {
        return None;
    }

    for index in hint.values() {
        let keys: BTreeSet<&str> = index.keys.iter().map(String::as_str).collect();
        if keys == column_set {
            memo.insert(bitmap.clone(), Some(index.name.clone()));
            return Some(index.name.clone());
        }
    }

    let mut best: Option<(String, usize)> = None;
    for i in 0..bitmap.len() {
        if !bitmap[i] {
            continue;
        }
        bitmap[i] = false;
        if let Some(name) = match_subset(columns, hint, bitmap, memo) {
            let key_cnt = hint.get(&name).map_or(0, |index| index.keys.len());
            if best.as_ref().map_or(true, |(_, cnt)| *cnt < key_cnt) {
                best = Some((name, key_cnt));
            }
        }
        bitmap[i] = true;
    }

    let best = best.map(|(name, _)| name);
    memo.insert(bitmap.clone(), best.clone());
    best
}

/// Grouping keys split into the index keys and what remains.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRewrite {
    pub index_name: String,
    /// Group expressions absorbed by the index, in index key order.
    pub keys: Vec<Expr>,
    /// Group expressions the index does not cover.
    pub residual: Vec<Expr>,
}

/// Choose an index for `groups` and split the keys it absorbs.
pub fn transform_group_expr(groups: &[Expr], hint: &IndexHint) -> Option<GroupRewrite> {
    let columns: Vec<String> = groups
        .iter()
        .filter_map(|g| g.as_column().map(|c| c.column.clone()))
        .collect();
    if columns.is_empty() {
        return None;
    }

    let index_name = match_best_index(&columns, hint)?;
    let index = hint.get(&index_name)?;

    let mut keys = Vec::with_capacity(index.keys.len());
    for key in &index.keys {
        let matched = groups
            .iter()
            .find(|g| g.as_column().is_some_and(|c| &c.column == key));
        if let Some(expr) = matched {
            keys.push(expr.clone());
        }
    }

    let residual = groups
        .iter()
        .filter(|g| match g.as_column() {
            Some(col) => !index.keys.contains(&col.column),
            None => true,
        })
        .cloned()
        .collect();

    Some(GroupRewrite {
        index_name,
        keys,
        residual,
    })
}

/// Drop the leading order key when the index already sorts by it.
pub fn transform_order_expr(order: &OrderBy, ts_column: &str) -> Option<OrderBy> {
    let first = order.exprs.first()?.as_column()?;
    if first.column != ts_column {
        return None;
    }
    Some(OrderBy::new(order.exprs[1..].to_vec(), order.ascending))
}
