//! The rule pipeline: name resolution, plan shaping, pushdown, and index
//! assignment. Rules run in the order [`default_rules`] lists them.

mod indexes;
mod pushdown;
mod resolution;
mod shape;

pub use indexes::{get_indexes, IndexCandidate};
pub use resolution::dual_table;

use riffle_common::{Result, RiffleError};
use riffle_sql::{Expression, FieldRef, Schema};

use crate::analyzer::Rule;

/// The default pipeline, in application order.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "resolve_subqueries",
            apply: resolution::resolve_subqueries,
        },
        Rule {
            name: "resolve_tables",
            apply: resolution::resolve_tables,
        },
        Rule {
            name: "resolve_natural_joins",
            apply: resolution::resolve_natural_joins,
        },
        Rule {
            name: "resolve_orderby_literals",
            apply: resolution::resolve_orderby_literals,
        },
        Rule {
            name: "resolve_star",
            apply: resolution::resolve_star,
        },
        Rule {
            name: "qualify_columns",
            apply: resolution::qualify_columns,
        },
        Rule {
            name: "resolve_columns",
            apply: resolution::resolve_columns,
        },
        Rule {
            name: "resolve_functions",
            apply: resolution::resolve_functions,
        },
        Rule {
            name: "reorder_projection",
            apply: shape::reorder_projection,
        },
        Rule {
            name: "optimize_distinct",
            apply: shape::optimize_distinct,
        },
        Rule {
            name: "assign_indexes",
            apply: indexes::assign_indexes,
        },
        Rule {
            name: "pushdown",
            apply: pushdown::pushdown,
        },
        Rule {
            name: "erase_projection",
            apply: shape::erase_projection,
        },
    ]
}

/// Look a rule up by name, for tests exercising a single rewrite.
pub fn rule(name: &str) -> Option<Rule> {
    default_rules().into_iter().find(|r| r.name == name)
}

/// Split a predicate into its top-level AND conjuncts.
pub(crate) fn split_conjuncts(expr: Expression) -> Vec<Expression> {
    match expr {
        Expression::And(a, b) => {
            let mut v = split_conjuncts(*a);
            v.extend(split_conjuncts(*b));
            v
        }
        other => vec![other],
    }
}

/// Positional field reference for a schema column.
pub(crate) fn schema_field(col: &riffle_sql::Column, index: usize) -> Expression {
    if col.source.is_empty() {
        Expression::field(index, col.data_type.clone(), col.name.clone(), col.nullable)
    } else {
        Expression::field_with_table(
            index,
            col.data_type.clone(),
            col.source.clone(),
            col.name.clone(),
            col.nullable,
        )
    }
}

/// Recompute one field reference against `schema`, matching by
/// `(table, name)`. Type and nullability are refreshed from the schema.
pub(crate) fn reindex_field(f: FieldRef, schema: &Schema) -> Result<Expression> {
    let index = schema.index_of(f.table.as_deref(), &f.name).ok_or_else(|| {
        RiffleError::InvalidPlan(format!(
            "column {} is not part of the rewritten schema",
            Expression::Field(f.clone())
        ))
    })?;
    let col = schema.column(index).ok_or_else(|| {
        RiffleError::InvalidPlan(format!("schema index {index} out of range"))
    })?;
    Ok(Expression::Field(FieldRef {
        index,
        data_type: col.data_type.clone(),
        table: f.table,
        name: f.name,
        nullable: col.nullable,
    }))
}

/// Recompute every field index inside `expr` against `schema`.
pub(crate) fn fix_field_indexes(expr: Expression, schema: &Schema) -> Result<Expression> {
    expr.transform_up(&mut |e| match e {
        Expression::Field(f) => reindex_field(f, schema),
        other => Ok(other),
    })
}
