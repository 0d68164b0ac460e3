use std::collections::HashMap;
use std::sync::OnceLock;

use arrow_schema::DataType;

use riffle_common::{Result, RiffleError};
use riffle_sql::{
    Capability, Column, Context, Expression, MemTable, Plan, SortField, TableRef, Value,
};

use crate::analyzer::Analyzer;
use crate::rules::schema_field;

/// Built-in one-row table every database resolves `dual` to.
pub fn dual_table() -> TableRef {
    static DUAL: OnceLock<TableRef> = OnceLock::new();
    DUAL.get_or_init(|| {
        TableRef::new(
            MemTable::new(
                "dual",
                vec![Column::new("dummy", DataType::Utf8, "dual", false)],
            )
            .with_rows(vec![vec![Value::Utf8("x".to_string())]])
            .with_capability(Capability::Basic),
        )
    })
    .clone()
}

/// Analyze each subquery alias body with a fresh analyzer pass and cache
/// the resulting schema under the alias name.
pub(crate) fn resolve_subqueries(ctx: &Context, a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| match node {
        Plan::SubqueryAlias { name, child, .. } if !child.resolved() => {
            let analyzed = a.analyze(ctx, *child)?;
            Ok(Plan::subquery_alias(name, analyzed))
        }
        other => Ok(other),
    })
}

/// Replace unresolved table references with tables from the current
/// database. `dual` falls back to the built-in one-row table.
pub(crate) fn resolve_tables(_ctx: &Context, a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| match node {
        Plan::UnresolvedTable { name } => {
            match a.catalog.table(&a.current_database, &name) {
                Ok(table) => Ok(Plan::Table { table }),
                Err(RiffleError::TableNotFound(_)) | Err(RiffleError::DatabaseNotFound(_))
                    if name == "dual" =>
                {
                    Ok(Plan::Table {
                        table: dual_table(),
                    })
                }
                Err(e) => Err(e),
            }
        }
        other => Ok(other),
    })
}

/// Expand `NaturalJoin(L, R)` into a cross join when the sides share no
/// column name, otherwise into a projection over an inner join equating
/// the shared columns by position.
pub(crate) fn resolve_natural_joins(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        let Plan::NaturalJoin { left, right } = node else {
            return Ok(node);
        };
        if !left.resolved() || !right.resolved() {
            return Ok(Plan::NaturalJoin { left, right });
        }

        let ls = left.schema();
        let rs = right.schema();
        let left_width = ls.len();

        // shared column positions, ordered by appearance on the left
        let mut common: Vec<(usize, usize)> = Vec::new();
        for (i, lc) in ls.iter().enumerate() {
            if let Some(j) = rs.iter().position(|rc| rc.name == lc.name) {
                common.push((i, j));
            }
        }
        if common.is_empty() {
            return Ok(Plan::CrossJoin { left, right });
        }

        let mut cols = Vec::new();
        for &(i, _) in &common {
            cols.push(schema_field(&ls.columns()[i], i));
        }
        for (i, lc) in ls.iter().enumerate() {
            if !common.iter().any(|&(ci, _)| ci == i) {
                cols.push(schema_field(lc, i));
            }
        }
        for (j, rc) in rs.iter().enumerate() {
            if !common.iter().any(|&(_, cj)| cj == j) {
                cols.push(schema_field(rc, left_width + j));
            }
        }

        let conjuncts: Vec<Expression> = common
            .iter()
            .map(|&(i, j)| {
                Expression::equals(
                    schema_field(&ls.columns()[i], i),
                    schema_field(&rs.columns()[j], left_width + j),
                )
            })
            .collect();
        let predicate = Expression::and_all(conjuncts).ok_or_else(|| {
            RiffleError::InvalidPlan("natural join produced no join predicate".to_string())
        })?;

        Ok(Plan::Project {
            exprs: cols,
            child: Box::new(Plan::InnerJoin {
                left,
                right,
                predicate,
            }),
        })
    })
}

/// Rewrite integer ORDER BY positions to the named column they select,
/// 1-based within the child schema.
pub(crate) fn resolve_orderby_literals(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        let Plan::Sort { fields, child } = node else {
            return Ok(node);
        };
        let schema = child.schema();
        if schema.is_empty() {
            return Ok(Plan::Sort { fields, child });
        }
        let fields = fields
            .into_iter()
            .map(|sf| match sf.expr {
                Expression::Literal {
                    value: Value::Int64(n),
                    ..
                } => {
                    if n < 1 || n as usize > schema.len() {
                        return Err(RiffleError::OrderByColumnIndex(n, schema.len()));
                    }
                    let col = &schema.columns()[n as usize - 1];
                    Ok(SortField {
                        expr: Expression::column(col.name.clone()),
                        direction: sf.direction,
                    })
                }
                expr => Ok(SortField {
                    expr,
                    direction: sf.direction,
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Plan::Sort { fields, child })
    })
}

/// Expand `*` and `table.*` inside projections and group-bys, preserving
/// the position of interleaved expressions.
pub(crate) fn resolve_star(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| match node {
        Plan::Project { exprs, child } if child.resolved() => {
            let exprs = expand_stars(exprs, &child.schema())?;
            Ok(Plan::Project { exprs, child })
        }
        Plan::GroupBy {
            aggregates,
            grouping,
            child,
        } if child.resolved() => {
            let schema = child.schema();
            Ok(Plan::GroupBy {
                aggregates: expand_stars(aggregates, &schema)?,
                grouping: expand_stars(grouping, &schema)?,
                child,
            })
        }
        other => Ok(other),
    })
}

fn expand_stars(
    exprs: Vec<Expression>,
    schema: &riffle_sql::Schema,
) -> Result<Vec<Expression>> {
    let mut out = Vec::new();
    for e in exprs {
        match e {
            Expression::Star { table: None } => {
                for (i, col) in schema.iter().enumerate() {
                    out.push(schema_field(col, i));
                }
            }
            Expression::Star { table: Some(t) } => {
                let mut any = false;
                for (i, col) in schema.iter().enumerate() {
                    if col.source == t {
                        out.push(schema_field(col, i));
                        any = true;
                    }
                }
                if !any {
                    return Err(RiffleError::TableNotFound(t));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Tables visible to a node's expressions: scan names with their column
/// lists, plus alias-to-table mappings collected on the way down.
/// Subquery aliases are opaque; the alias is the table identity.
#[derive(Default)]
struct Scope {
    tables: Vec<(String, Vec<String>)>,
    aliases: HashMap<String, String>,
}

impl Scope {
    fn of_children(node: &Plan) -> Scope {
        let mut scope = Scope::default();
        for child in node.children() {
            scope.collect(child);
        }
        scope
    }

    fn collect(&mut self, plan: &Plan) {
        match plan {
            Plan::Table { table }
            | Plan::ProjectedTable { table, .. }
            | Plan::FilteredTable { table, .. }
            | Plan::IndexedTable { table, .. } => {
                self.push_table(
                    table.name().to_string(),
                    table.schema().iter().map(|c| c.name.clone()).collect(),
                );
            }
            Plan::TableAlias { name, child } => {
                let before = self.tables.len();
                self.collect(child);
                if let Some((real, _)) = self.tables.get(before) {
                    self.aliases.insert(name.clone(), real.clone());
                }
            }
            Plan::SubqueryAlias { name, schema, .. } => {
                self.push_table(
                    name.clone(),
                    schema.iter().map(|c| c.name.clone()).collect(),
                );
            }
            Plan::UnresolvedTable { .. } => {}
            other => {
                for child in other.children() {
                    self.collect(child);
                }
            }
        }
    }

    fn push_table(&mut self, name: String, columns: Vec<String>) {
        if !self.tables.iter().any(|(n, _)| *n == name) {
            self.tables.push((name, columns));
        }
    }
}

/// Qualify bare column references with the single table defining them;
/// peel table aliases off already-qualified references.
pub(crate) fn qualify_columns(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        if node.node_expressions().is_empty() || !node.children_resolved() {
            return Ok(node);
        }
        let scope = Scope::of_children(&node);
        if scope.tables.is_empty() {
            return Ok(node);
        }
        node.transform_own_expressions(&mut |e| match e {
            Expression::Column { table: None, name } => {
                let mut defining = scope
                    .tables
                    .iter()
                    .filter(|(_, cols)| cols.contains(&name));
                match (defining.next(), defining.next()) {
                    (Some(_), Some(_)) => Err(RiffleError::AmbiguousColumnName(name)),
                    (Some((t, _)), None) => Ok(Expression::Column {
                        table: Some(t.clone()),
                        name,
                    }),
                    // a parent scope may bind it; later rules catch residue
                    (None, _) => Ok(Expression::Column { table: None, name }),
                }
            }
            Expression::Column {
                table: Some(t),
                name,
            } => {
                if let Some(real) = scope.aliases.get(&t) {
                    Ok(Expression::Column {
                        table: Some(real.clone()),
                        name,
                    })
                } else if scope.tables.iter().any(|(n, _)| *n == t) {
                    Ok(Expression::Column {
                        table: Some(t),
                        name,
                    })
                } else {
                    Err(RiffleError::TableNotFound(t))
                }
            }
            other => Ok(other),
        })
    })
}

/// Replace qualified column references with positional fields into the
/// node's input schema.
pub(crate) fn resolve_columns(_ctx: &Context, _a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_up(&mut |node| {
        if node.node_expressions().is_empty() || !node.children_resolved() {
            return Ok(node);
        }
        let input = node.input_schema();
        if input.is_empty() {
            return Ok(node);
        }
        node.transform_own_expressions(&mut |e| match e {
            Expression::Column {
                table: Some(t),
                name,
            } => match input.index_of(Some(&t), &name) {
                Some(index) => {
                    let col = &input.columns()[index];
                    Ok(Expression::field_with_table(
                        index,
                        col.data_type.clone(),
                        t,
                        name,
                        col.nullable,
                    ))
                }
                None => Err(RiffleError::ColumnNotFound(t, name)),
            },
            other => Ok(other),
        })
    })
}

/// Bind function calls to catalog-registered scalar functions.
pub(crate) fn resolve_functions(_ctx: &Context, a: &Analyzer, plan: Plan) -> Result<Plan> {
    plan.transform_expressions_up(&mut |e| match e {
        Expression::Call { name, args } => {
            let function = a.catalog.function(&name)?;
            Ok(Expression::ScalarFunction { function, args })
        }
        other => Ok(other),
    })
}
