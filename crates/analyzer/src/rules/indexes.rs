use std::collections::HashMap;

use riffle_common::Result;
use riffle_sql::{Capability, CompareOp, Context, Expression, IndexRef, LookupRef, Plan, Value};

use crate::analyzer::Analyzer;

/// An index lookup chosen for one table, with the index handles that
/// produced it (released when the lookup is dropped by the executor).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCandidate {
    pub lookup: LookupRef,
    pub indexes: Vec<IndexRef>,
}

/// For each filter, interpret its predicate over the catalog's ready
/// indexes and mark every indexable scan that got a lookup with an
/// `IndexHint` for `pushdown` to consume.
pub(crate) fn assign_indexes(_ctx: &Context, a: &Analyzer, plan: Plan) -> Result<Plan> {
    if !plan.resolved() {
        return Ok(plan);
    }
    plan.transform_up(&mut |node| {
        let Plan::Filter { predicate, child } = node else {
            return Ok(node);
        };
        let candidates = get_indexes(&predicate, a)?;
        if candidates.is_empty() {
            return Ok(Plan::Filter { predicate, child });
        }
        let child = apply_hints(*child, &candidates)?;
        Ok(Plan::Filter {
            predicate,
            child: Box::new(child),
        })
    })
}

fn apply_hints(plan: Plan, candidates: &HashMap<String, IndexCandidate>) -> Result<Plan> {
    match plan {
        // already marked by an earlier pass
        hint @ Plan::IndexHint { .. } => Ok(hint),
        Plan::Table { table } if table.capability() == Capability::Indexable => {
            match candidates.get(table.name()) {
                Some(c) => Ok(Plan::IndexHint {
                    lookup: c.lookup.clone(),
                    indexes: c.indexes.clone(),
                    child: Box::new(Plan::Table { table }),
                }),
                None => Ok(Plan::Table { table }),
            }
        }
        other => other.map_children(&mut |child| apply_hints(child, candidates)),
    }
}

/// Interpret a boolean predicate over indexed columns, producing one
/// candidate lookup per table (keyed by the index's table).
///
/// - `col = literal` on an indexed expression yields a single-key lookup
/// - `IN` over literals yields the n-way union of single-key lookups
/// - `AND` intersects mergeable lookups per table and keeps one-sided
///   tables as-is; a non-mergeable pair drops the table
/// - `OR` unions mergeable lookups per table, keeping one-sided tables;
///   the enclosing filter stays in place either way
/// - anything else contributes nothing
pub fn get_indexes(expr: &Expression, a: &Analyzer) -> Result<HashMap<String, IndexCandidate>> {
    let mut out = HashMap::new();
    match expr {
        Expression::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => {
            let Some((column, key)) = equality_parts(left.as_ref(), right.as_ref()) else {
                return Ok(out);
            };
            if let Some(idx) = a
                .catalog
                .index_by_expression(&a.current_database, column)
            {
                let lookup = idx.get(key)?;
                out.insert(
                    idx.table().to_string(),
                    IndexCandidate {
                        lookup,
                        indexes: vec![idx],
                    },
                );
            }
        }
        Expression::In { expr: column, tuple } => {
            if !matches!(column.as_ref(), Expression::Field(_)) {
                return Ok(out);
            }
            let Expression::Tuple(list) = tuple.as_ref() else {
                return Ok(out);
            };
            let mut keys = Vec::with_capacity(list.len());
            for e in list {
                match e {
                    Expression::Literal { value, .. } => keys.push(value),
                    _ => return Ok(out),
                }
            }
            let Some(idx) = a
                .catalog
                .index_by_expression(&a.current_database, column.as_ref())
            else {
                return Ok(out);
            };
            let mut lookups = Vec::with_capacity(keys.len());
            for key in keys {
                lookups.push(idx.get(key)?);
            }
            let Some(first) = lookups.first().cloned() else {
                return Ok(out);
            };
            let rest = &lookups[1..];
            let lookup = if rest.is_empty() {
                first
            } else {
                match first.union(rest) {
                    Some(merged) => merged,
                    // backend without set operations cannot serve IN
                    None => return Ok(out),
                }
            };
            out.insert(
                idx.table().to_string(),
                IndexCandidate {
                    lookup,
                    indexes: vec![idx],
                },
            );
        }
        Expression::And(l, r) => {
            return Ok(indexes_intersection(get_indexes(l, a)?, get_indexes(r, a)?));
        }
        Expression::Or(l, r) => {
            return Ok(combine(
                get_indexes(l, a)?,
                get_indexes(r, a)?,
                |lookup, other| lookup.union(&[other]),
            ));
        }
        _ => {}
    }
    Ok(out)
}

fn equality_parts<'a>(
    left: &'a Expression,
    right: &'a Expression,
) -> Option<(&'a Expression, &'a Value)> {
    match (left, right) {
        (field @ Expression::Field(_), Expression::Literal { value, .. }) => Some((field, value)),
        (Expression::Literal { value, .. }, field @ Expression::Field(_)) => Some((field, value)),
        _ => None,
    }
}

/// Combine the per-table candidates of two AND sides. Tables on one side
/// pass through; tables on both sides intersect when their lookups are
/// mergeable and drop otherwise.
pub(crate) fn indexes_intersection(
    left: HashMap<String, IndexCandidate>,
    right: HashMap<String, IndexCandidate>,
) -> HashMap<String, IndexCandidate> {
    combine(left, right, |lookup, other| lookup.intersection(&[other]))
}

/// Merge two per-table candidate maps. Tables on one side pass through;
/// tables on both sides combine through `merge` when mergeable and drop
/// otherwise (or when the backend does not support the operation).
fn combine(
    left: HashMap<String, IndexCandidate>,
    mut right: HashMap<String, IndexCandidate>,
    merge: impl Fn(&LookupRef, LookupRef) -> Option<LookupRef>,
) -> HashMap<String, IndexCandidate> {
    let mut out = HashMap::new();
    for (table, lc) in left {
        match right.remove(&table) {
            None => {
                out.insert(table, lc);
            }
            Some(rc) => {
                if !lc.lookup.is_mergeable(&rc.lookup) {
                    continue;
                }
                if let Some(merged) = merge(&lc.lookup, rc.lookup) {
                    let mut indexes = lc.indexes;
                    indexes.extend(rc.indexes);
                    out.insert(
                        table,
                        IndexCandidate {
                            lookup: merged,
                            indexes,
                        },
                    );
                }
            }
        }
    }
    for (table, rc) in right {
        out.insert(table, rc);
    }
    out
}
