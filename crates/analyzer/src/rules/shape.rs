use std::collections::{HashMap, HashSet};

use riffle_common::{Result, RiffleError};
use riffle_sql::{Context, Expression, Plan, SortField};

use crate::analyzer::Analyzer;
use crate::rules::{fix_field_indexes, schema_field};

/// Move aliased projection expressions below the operators that refer to
/// them by name, so the references resolve positionally.
///
/// For each alias referenced by a descendant sort or filter, a new
/// projection introducing the alias is injected immediately above the
/// referring operator's child, the reference becomes a positional field,
/// and the outer projection consumes the alias as a column. One
/// application reaches a fixed point: rewritten references are fields,
/// not names, so nothing is left to move.
pub(crate) fn reorder_projection(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        let Plan::Project { exprs, child } = node else {
            return Ok(node);
        };

        let alias_order: Vec<String> = exprs
            .iter()
            .filter_map(|e| match e {
                Expression::Alias { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        if alias_order.is_empty() {
            return Ok(Plan::Project { exprs, child });
        }
        let aliases: HashMap<String, Expression> = exprs
            .iter()
            .filter_map(|e| match e {
                Expression::Alias { name, .. } => Some((name.clone(), e.clone())),
                _ => None,
            })
            .collect();

        let (new_child, introduced) = inject_aliases(*child, &aliases, &alias_order)?;
        if introduced.is_empty() {
            return Ok(Plan::Project {
                exprs,
                child: Box::new(new_child),
            });
        }

        let child_schema = new_child.schema();
        let new_exprs = exprs
            .into_iter()
            .map(|e| match e {
                Expression::Alias { ref name, .. } if introduced.contains(name) => {
                    let index = child_schema.index_of(None, name).ok_or_else(|| {
                        RiffleError::InvalidPlan(format!(
                            "alias {name} missing from reordered child schema"
                        ))
                    })?;
                    let col = &child_schema.columns()[index];
                    Ok(Expression::field(
                        index,
                        col.data_type.clone(),
                        name.clone(),
                        col.nullable,
                    ))
                }
                other => fix_field_indexes(other, &child_schema),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Plan::Project {
            exprs: new_exprs,
            child: Box::new(new_child),
        })
    })
}

/// Walk the sort/filter chain under a projection, injecting a projection
/// that introduces each referenced alias above the referring operator's
/// child. Returns the rewritten chain and the alias names introduced.
fn inject_aliases(
    plan: Plan,
    aliases: &HashMap<String, Expression>,
    alias_order: &[String],
) -> Result<(Plan, HashSet<String>)> {
    match plan {
        Plan::Sort { fields, child } => {
            let (child, mut introduced) = inject_aliases(*child, aliases, alias_order)?;
            let exprs: Vec<&Expression> = fields.iter().map(|f| &f.expr).collect();
            let needed = referenced_aliases(&exprs, aliases, &introduced, alias_order);
            let child = introduce(child, &needed, aliases, &mut introduced)?;
            let schema = child.schema();
            let fields = fields
                .into_iter()
                .map(|sf| {
                    Ok(SortField {
                        expr: bind_alias_refs(sf.expr, &introduced, &schema)?,
                        direction: sf.direction,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((
                Plan::Sort {
                    fields,
                    child: Box::new(child),
                },
                introduced,
            ))
        }
        Plan::Filter { predicate, child } => {
            let (child, mut introduced) = inject_aliases(*child, aliases, alias_order)?;
            let needed = referenced_aliases(&[&predicate], aliases, &introduced, alias_order);
            let child = introduce(child, &needed, aliases, &mut introduced)?;
            let schema = child.schema();
            let predicate = bind_alias_refs(predicate, &introduced, &schema)?;
            Ok((
                Plan::Filter {
                    predicate,
                    child: Box::new(child),
                },
                introduced,
            ))
        }
        other => Ok((other, HashSet::new())),
    }
}

fn referenced_aliases(
    exprs: &[&Expression],
    aliases: &HashMap<String, Expression>,
    introduced: &HashSet<String>,
    alias_order: &[String],
) -> Vec<String> {
    let mut found: HashSet<String> = HashSet::new();
    for e in exprs {
        e.visit(&mut |e| {
            if let Expression::Column { table: None, name } = e {
                if aliases.contains_key(name) && !introduced.contains(name) {
                    found.insert(name.clone());
                }
            }
        });
    }
    alias_order
        .iter()
        .filter(|n| found.contains(*n))
        .cloned()
        .collect()
}

/// Wrap `child` in a projection of its own columns plus the named alias
/// expressions. Skipped while the child is still unresolved; a later
/// pass picks it up.
fn introduce(
    child: Plan,
    needed: &[String],
    aliases: &HashMap<String, Expression>,
    introduced: &mut HashSet<String>,
) -> Result<Plan> {
    if needed.is_empty() || !child.resolved() {
        return Ok(child);
    }
    let schema = child.schema();
    let mut exprs: Vec<Expression> = schema
        .iter()
        .enumerate()
        .map(|(i, c)| schema_field(c, i))
        .collect();
    for name in needed {
        let alias = aliases.get(name).ok_or_else(|| {
            RiffleError::InvalidPlan(format!("alias {name} vanished during reorder"))
        })?;
        exprs.push(alias.clone());
        introduced.insert(name.clone());
    }
    Ok(Plan::Project {
        exprs,
        child: Box::new(child),
    })
}

fn bind_alias_refs(
    expr: Expression,
    introduced: &HashSet<String>,
    schema: &riffle_sql::Schema,
) -> Result<Expression> {
    expr.transform_up(&mut |e| match e {
        Expression::Column { table: None, name } if introduced.contains(&name) => {
            let index = schema.index_of(None, &name).ok_or_else(|| {
                RiffleError::InvalidPlan(format!("alias {name} missing from injected schema"))
            })?;
            let col = &schema.columns()[index];
            Ok(Expression::field(
                index,
                col.data_type.clone(),
                name,
                col.nullable,
            ))
        }
        other => Ok(other),
    })
}

/// Remove projections that pass their child schema through unchanged.
pub(crate) fn erase_projection(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        let Plan::Project { exprs, child } = node else {
            return Ok(node);
        };
        if !child.resolved() {
            return Ok(Plan::Project { exprs, child });
        }
        let child_schema = child.schema();
        let passthrough = exprs.len() == child_schema.len()
            && exprs.iter().enumerate().all(|(i, e)| {
                matches!(e, Expression::Field(f)
                    if f.index == i
                        && f.name == child_schema.columns()[i].name
                        && f.data_type == child_schema.columns()[i].data_type)
            });
        if !passthrough {
            return Ok(Plan::Project { exprs, child });
        }
        let projected: riffle_sql::Schema = exprs.iter().map(|e| e.schema_column()).collect();
        if projected == child_schema {
            Ok(*child)
        } else {
            Ok(Plan::Project { exprs, child })
        }
    })
}

/// Distinct over sorted input can drop duplicates streamingly.
pub(crate) fn optimize_distinct(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| match node {
        Plan::Distinct { child } if matches!(*child, Plan::Sort { .. }) => {
            Ok(Plan::OrderedDistinct { child })
        }
        other => Ok(other),
    })
}
