use std::collections::HashMap;
use std::sync::Arc;

use riffle_common::{Result, RiffleError};
use riffle_sql::{
    Capability, Catalog, Context, Expression, IndexRef, LookupRef, Plan, ReleasingLookup,
    TableRef,
};

use crate::analyzer::Analyzer;
use crate::rules::{fix_field_indexes, reindex_field, schema_field, split_conjuncts};

/// Push projection columns and single-table filter conjuncts into scans
/// that advertise the matching capability, consuming index hints left by
/// `assign_indexes`. Applies to resolved projection-rooted subtrees that
/// still contain a plain capable scan; rewritten carriers are final and
/// never touched again, which keeps repeated application a fixed point.
pub(crate) fn pushdown(_ctx: &Context, a: &Analyzer, plan: Plan) -> Result<Plan> {
    if !plan.resolved() {
        return Ok(plan);
    }
    plan.transform_up(&mut |node| match node {
        Plan::Project { .. } => pushdown_project(a, node),
        other => Ok(other),
    })
}

fn pushdown_project(a: &Analyzer, node: Plan) -> Result<Plan> {
    if !has_pushdown_candidate(&node) {
        return Ok(node);
    }

    // 1. per-table required columns, in first-use order
    let mut fields_by_table: HashMap<String, Vec<String>> = HashMap::new();
    collect_fields(&node, &mut fields_by_table);

    // 2. single-table filter conjuncts; multi-table conjuncts stay put
    let mut filters_by_table: HashMap<String, Vec<Expression>> = HashMap::new();
    collect_filters(&node, &mut filters_by_table);

    // 3. capability dispatch on each plain scan, collecting the accepted
    // conjuncts so the enclosing filters can drop them
    let mut pass = RewritePass {
        fields_by_table: &fields_by_table,
        filters_by_table: &filters_by_table,
        handled: Vec::new(),
        catalog: Arc::clone(&a.catalog),
    };
    let rewritten = pass.rewrite(node)?;

    // 4. the scans' emitted schemas changed shape; recompute surviving
    // field indices against each node's new input schema
    rewritten.transform_up(&mut |n| {
        let input = n.input_schema();
        if n.node_expressions().is_empty() || input.is_empty() {
            return Ok(n);
        }
        n.transform_own_expressions(&mut |e| match e {
            Expression::Field(f) => reindex_field(f, &input),
            other => Ok(other),
        })
    })
}

fn has_pushdown_candidate(plan: &Plan) -> bool {
    match plan {
        Plan::Table { table } => table.capability() != Capability::Basic,
        Plan::IndexHint { child, .. } => has_pushdown_candidate(child),
        other => other.children().into_iter().any(has_pushdown_candidate),
    }
}

fn collect_fields(plan: &Plan, out: &mut HashMap<String, Vec<String>>) {
    for e in plan.node_expressions() {
        e.visit(&mut |e| {
            if let Expression::Field(f) = e {
                if let Some(t) = &f.table {
                    let entry = out.entry(t.clone()).or_default();
                    if !entry.contains(&f.name) {
                        entry.push(f.name.clone());
                    }
                }
            }
        });
    }
    for child in plan.children() {
        collect_fields(child, out);
    }
}

fn collect_filters(plan: &Plan, out: &mut HashMap<String, Vec<Expression>>) {
    if let Plan::Filter { predicate, .. } = plan {
        for conjunct in split_conjuncts(predicate.clone()) {
            let tables = conjunct.referenced_tables();
            if let [table] = tables.as_slice() {
                out.entry(table.clone()).or_default().push(conjunct);
            }
        }
    }
    for child in plan.children() {
        collect_filters(child, out);
    }
}

struct RewritePass<'a> {
    fields_by_table: &'a HashMap<String, Vec<String>>,
    filters_by_table: &'a HashMap<String, Vec<Expression>>,
    handled: Vec<Expression>,
    catalog: Arc<Catalog>,
}

impl RewritePass<'_> {
    /// Rewrite scans bottom-up, handling `IndexHint` before descending so
    /// the hint reaches its scan, and rebuild each filter after its
    /// subtree so accepted conjuncts are known by then.
    fn rewrite(&mut self, plan: Plan) -> Result<Plan> {
        match plan {
            Plan::IndexHint {
                lookup,
                indexes,
                child,
            } => match *child {
                Plan::Table { table } if table.capability() == Capability::Indexable => {
                    self.rewrite_scan(table, Some((lookup, indexes)))
                }
                other_child => Ok(Plan::IndexHint {
                    lookup,
                    indexes,
                    child: Box::new(self.rewrite(other_child)?),
                }),
            },
            Plan::Table { table } => self.rewrite_scan(table, None),
            Plan::Filter { predicate, child } => {
                let child = Box::new(self.rewrite(*child)?);
                if self.handled.is_empty() {
                    return Ok(Plan::Filter { predicate, child });
                }
                let handled = &self.handled;
                let remaining: Vec<Expression> = split_conjuncts(predicate)
                    .into_iter()
                    .filter(|c| !handled.contains(c))
                    .collect();
                match Expression::and_all(remaining) {
                    Some(predicate) => Ok(Plan::Filter { predicate, child }),
                    None => Ok(*child),
                }
            }
            other => other.map_children(&mut |child| self.rewrite(child)),
        }
    }

    fn rewrite_scan(
        &mut self,
        table: TableRef,
        hint: Option<(LookupRef, Vec<IndexRef>)>,
    ) -> Result<Plan> {
        let fields_by_table = self.fields_by_table;
        let filters_by_table = self.filters_by_table;
        let handled = &mut self.handled;
        let catalog = &self.catalog;
        rewrite_scan(
            table,
            hint,
            fields_by_table,
            filters_by_table,
            handled,
            catalog,
        )
    }
}

fn rewrite_scan(
    table: TableRef,
    hint: Option<(LookupRef, Vec<IndexRef>)>,
    fields_by_table: &HashMap<String, Vec<String>>,
    filters_by_table: &HashMap<String, Vec<Expression>>,
    handled: &mut Vec<Expression>,
    catalog: &Arc<Catalog>,
) -> Result<Plan> {
    let Some(required) = fields_by_table.get(table.name()) else {
        // the plan never references this table's columns; leave the scan
        // (and any hint on it) for a later pass
        return Ok(wrap_hint(Plan::Table { table }, hint));
    };

    match table.capability() {
        Capability::Basic => Ok(wrap_hint(Plan::Table { table }, hint)),
        Capability::ProjectionPushdown => Ok(wrap_hint(
            Plan::ProjectedTable {
                columns: required.clone(),
                table,
            },
            hint,
        )),
        Capability::ProjectionAndFilterPushdown | Capability::Indexable => {
            let schema = table.schema().clone();
            let columns = required
                .iter()
                .map(|name| {
                    let index = schema
                        .iter()
                        .position(|c| c.name == *name)
                        .ok_or_else(|| {
                            RiffleError::InvalidPlan(format!(
                                "required column {name} missing from table {}",
                                table.name()
                            ))
                        })?;
                    Ok(schema_field(&schema.columns()[index], index))
                })
                .collect::<Result<Vec<_>>>()?;

            let candidates = filters_by_table
                .get(table.name())
                .cloned()
                .unwrap_or_default();
            let accepted = table.handled_filters(&candidates);
            let filters = accepted
                .iter()
                .map(|f| fix_field_indexes(f.clone(), &schema))
                .collect::<Result<Vec<_>>>()?;
            handled.extend(accepted);

            match (table.capability(), hint) {
                (Capability::Indexable, Some((lookup, indexes))) => {
                    let catalog = Arc::clone(catalog);
                    let released = indexes.clone();
                    let lookup = LookupRef::new(ReleasingLookup::new(lookup, move || {
                        for idx in &released {
                            catalog.release_index(idx);
                        }
                    }));
                    Ok(Plan::IndexedTable {
                        columns,
                        filters,
                        lookup,
                        table,
                    })
                }
                (_, hint) => Ok(wrap_hint(
                    Plan::FilteredTable {
                        columns,
                        filters,
                        table,
                    },
                    hint,
                )),
            }
        }
    }
}

fn wrap_hint(plan: Plan, hint: Option<(LookupRef, Vec<IndexRef>)>) -> Plan {
    match hint {
        Some((lookup, indexes)) => Plan::IndexHint {
            lookup,
            indexes,
            child: Box::new(plan),
        },
        None => plan,
    }
}
