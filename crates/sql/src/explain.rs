use crate::plan::{Plan, SortDirection};

/// Render a plan as human-readable multiline text.
pub fn explain_plan(plan: &Plan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &Plan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        Plan::UnresolvedTable { name } => {
            out.push_str(&format!("{pad}UnresolvedTable name={name}\n"));
        }
        Plan::Table { table } => {
            out.push_str(&format!("{pad}Table name={}\n", table.name()));
        }
        Plan::ProjectedTable { columns, table } => {
            out.push_str(&format!(
                "{pad}ProjectedTable name={} columns=[{}]\n",
                table.name(),
                columns.join(", ")
            ));
        }
        Plan::FilteredTable {
            columns,
            filters,
            table,
        } => {
            out.push_str(&format!("{pad}FilteredTable name={}\n", table.name()));
            out.push_str(&format!("{pad}  columns={}\n", render_exprs(columns)));
            out.push_str(&format!("{pad}  pushed_filters={}\n", filters.len()));
            for f in filters {
                out.push_str(&format!("{pad}    {f}\n"));
            }
        }
        Plan::IndexedTable {
            columns,
            filters,
            lookup,
            table,
        } => {
            out.push_str(&format!("{pad}IndexedTable name={}\n", table.name()));
            out.push_str(&format!("{pad}  columns={}\n", render_exprs(columns)));
            out.push_str(&format!("{pad}  pushed_filters={}\n", filters.len()));
            for f in filters {
                out.push_str(&format!("{pad}    {f}\n"));
            }
            out.push_str(&format!("{pad}  lookup={lookup:?}\n"));
        }
        Plan::IndexHint {
            lookup,
            indexes,
            child,
        } => {
            let ids: Vec<&str> = indexes.iter().map(|i| i.id()).collect();
            out.push_str(&format!(
                "{pad}IndexHint indexes=[{}] lookup={lookup:?}\n",
                ids.join(", ")
            ));
            fmt_plan(child, indent + 1, out);
        }
        Plan::TableAlias { name, child } => {
            out.push_str(&format!("{pad}TableAlias {name}\n"));
            fmt_plan(child, indent + 1, out);
        }
        Plan::SubqueryAlias { name, child, .. } => {
            out.push_str(&format!("{pad}SubqueryAlias {name}\n"));
            fmt_plan(child, indent + 1, out);
        }
        Plan::Project { exprs, child } => {
            out.push_str(&format!("{pad}Project\n"));
            for e in exprs {
                out.push_str(&format!("{pad}  {} := {e}\n", e.output_name()));
            }
            fmt_plan(child, indent + 1, out);
        }
        Plan::Filter { predicate, child } => {
            out.push_str(&format!("{pad}Filter {predicate}\n"));
            fmt_plan(child, indent + 1, out);
        }
        Plan::Sort { fields, child } => {
            let rendered: Vec<String> = fields
                .iter()
                .map(|f| {
                    let dir = match f.direction {
                        SortDirection::Ascending => "ASC",
                        SortDirection::Descending => "DESC",
                    };
                    format!("{} {dir}", f.expr)
                })
                .collect();
            out.push_str(&format!("{pad}Sort [{}]\n", rendered.join(", ")));
            fmt_plan(child, indent + 1, out);
        }
        Plan::GroupBy {
            aggregates,
            grouping,
            child,
        } => {
            out.push_str(&format!(
                "{pad}GroupBy aggregates={} grouping={}\n",
                render_exprs(aggregates),
                render_exprs(grouping)
            ));
            fmt_plan(child, indent + 1, out);
        }
        Plan::Distinct { child } => {
            out.push_str(&format!("{pad}Distinct\n"));
            fmt_plan(child, indent + 1, out);
        }
        Plan::OrderedDistinct { child } => {
            out.push_str(&format!("{pad}OrderedDistinct\n"));
            fmt_plan(child, indent + 1, out);
        }
        Plan::InnerJoin {
            left,
            right,
            predicate,
        } => {
            out.push_str(&format!("{pad}InnerJoin {predicate}\n"));
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
        Plan::CrossJoin { left, right } => {
            out.push_str(&format!("{pad}CrossJoin\n"));
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
        Plan::NaturalJoin { left, right } => {
            out.push_str(&format!("{pad}NaturalJoin\n"));
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
    }
}

fn render_exprs(exprs: &[crate::expression::Expression]) -> String {
    let rendered: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}
