use riffle_common::Result;

use crate::expression::Expression;
use crate::index::{IndexRef, LookupRef};
use crate::schema::Schema;
use crate::table::TableRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub expr: Expression,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(expr: Expression) -> Self {
        Self {
            expr,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(expr: Expression) -> Self {
        Self {
            expr,
            direction: SortDirection::Descending,
        }
    }
}

/// The relational plan algebra.
///
/// `UnresolvedTable` and `NaturalJoin` never report resolved; the
/// analyzer must replace them. The four scan variants (`Table`,
/// `ProjectedTable`, `FilteredTable`, `IndexedTable`) are the capability
/// flavors a storage backend can take; every carrier reports the wrapped
/// table's full schema, narrowing happens at execution. `IndexHint` is
/// the marker `assign_indexes` leaves on a scan for `pushdown` to
/// consume.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    UnresolvedTable {
        name: String,
    },
    Table {
        table: TableRef,
    },
    ProjectedTable {
        columns: Vec<String>,
        table: TableRef,
    },
    FilteredTable {
        columns: Vec<Expression>,
        filters: Vec<Expression>,
        table: TableRef,
    },
    IndexedTable {
        columns: Vec<Expression>,
        filters: Vec<Expression>,
        lookup: LookupRef,
        table: TableRef,
    },
    IndexHint {
        lookup: LookupRef,
        indexes: Vec<IndexRef>,
        child: Box<Plan>,
    },
    TableAlias {
        name: String,
        child: Box<Plan>,
    },
    SubqueryAlias {
        name: String,
        schema: Schema,
        child: Box<Plan>,
    },
    Project {
        exprs: Vec<Expression>,
        child: Box<Plan>,
    },
    Filter {
        predicate: Expression,
        child: Box<Plan>,
    },
    Sort {
        fields: Vec<SortField>,
        child: Box<Plan>,
    },
    GroupBy {
        aggregates: Vec<Expression>,
        grouping: Vec<Expression>,
        child: Box<Plan>,
    },
    Distinct {
        child: Box<Plan>,
    },
    OrderedDistinct {
        child: Box<Plan>,
    },
    InnerJoin {
        left: Box<Plan>,
        right: Box<Plan>,
        predicate: Expression,
    },
    CrossJoin {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    NaturalJoin {
        left: Box<Plan>,
        right: Box<Plan>,
    },
}

impl Plan {
    /// Subquery alias over `child`, caching the child schema with every
    /// column's source retagged to the alias name. Rebuild after the
    /// child changes so the cache stays consistent.
    pub fn subquery_alias(name: impl Into<String>, child: Plan) -> Plan {
        let name = name.into();
        let schema = child.schema().retagged(&name);
        Plan::SubqueryAlias {
            name,
            schema,
            child: Box::new(child),
        }
    }

    pub fn table(table: TableRef) -> Plan {
        Plan::Table { table }
    }

    /// Output schema of the node. Unresolved tables report an empty
    /// schema until replaced.
    pub fn schema(&self) -> Schema {
        match self {
            Plan::UnresolvedTable { .. } => Schema::empty(),
            Plan::Table { table }
            | Plan::ProjectedTable { table, .. }
            | Plan::FilteredTable { table, .. }
            | Plan::IndexedTable { table, .. } => table.schema().clone(),
            Plan::IndexHint { child, .. }
            | Plan::TableAlias { child, .. }
            | Plan::Filter { child, .. }
            | Plan::Sort { child, .. }
            | Plan::Distinct { child }
            | Plan::OrderedDistinct { child } => child.schema(),
            Plan::SubqueryAlias { schema, .. } => schema.clone(),
            Plan::Project { exprs, .. } => exprs.iter().map(|e| e.schema_column()).collect(),
            Plan::GroupBy { aggregates, .. } => {
                aggregates.iter().map(|e| e.schema_column()).collect()
            }
            Plan::InnerJoin { left, right, .. }
            | Plan::CrossJoin { left, right }
            | Plan::NaturalJoin { left, right } => left.schema().concat(&right.schema()),
        }
    }

    /// Schema the node's own expressions are resolved against: the
    /// concatenation of its children's schemas.
    pub fn input_schema(&self) -> Schema {
        match self {
            Plan::InnerJoin { left, right, .. }
            | Plan::CrossJoin { left, right }
            | Plan::NaturalJoin { left, right } => left.schema().concat(&right.schema()),
            Plan::IndexHint { child, .. }
            | Plan::TableAlias { child, .. }
            | Plan::SubqueryAlias { child, .. }
            | Plan::Project { child, .. }
            | Plan::Filter { child, .. }
            | Plan::Sort { child, .. }
            | Plan::GroupBy { child, .. }
            | Plan::Distinct { child }
            | Plan::OrderedDistinct { child } => child.schema(),
            _ => Schema::empty(),
        }
    }

    /// Recursively derived resolution flag.
    pub fn resolved(&self) -> bool {
        match self {
            Plan::UnresolvedTable { .. } | Plan::NaturalJoin { .. } => false,
            Plan::Table { .. }
            | Plan::ProjectedTable { .. }
            | Plan::FilteredTable { .. }
            | Plan::IndexedTable { .. } => true,
            Plan::IndexHint { child, .. }
            | Plan::TableAlias { child, .. }
            | Plan::SubqueryAlias { child, .. }
            | Plan::Distinct { child }
            | Plan::OrderedDistinct { child } => child.resolved(),
            Plan::Project { exprs, child } => {
                child.resolved() && exprs.iter().all(|e| e.resolved())
            }
            Plan::Filter { predicate, child } => child.resolved() && predicate.resolved(),
            Plan::Sort { fields, child } => {
                child.resolved() && fields.iter().all(|f| f.expr.resolved())
            }
            Plan::GroupBy {
                aggregates,
                grouping,
                child,
            } => {
                child.resolved()
                    && aggregates.iter().all(|e| e.resolved())
                    && grouping.iter().all(|e| e.resolved())
            }
            Plan::InnerJoin {
                left,
                right,
                predicate,
            } => left.resolved() && right.resolved() && predicate.resolved(),
            Plan::CrossJoin { left, right } => left.resolved() && right.resolved(),
        }
    }

    /// Direct child plans.
    pub fn children(&self) -> Vec<&Plan> {
        match self {
            Plan::IndexHint { child, .. }
            | Plan::TableAlias { child, .. }
            | Plan::SubqueryAlias { child, .. }
            | Plan::Project { child, .. }
            | Plan::Filter { child, .. }
            | Plan::Sort { child, .. }
            | Plan::GroupBy { child, .. }
            | Plan::Distinct { child }
            | Plan::OrderedDistinct { child } => vec![child],
            Plan::InnerJoin { left, right, .. }
            | Plan::CrossJoin { left, right }
            | Plan::NaturalJoin { left, right } => vec![left, right],
            _ => Vec::new(),
        }
    }

    /// Whether every direct child is resolved, regardless of this node's
    /// own expressions.
    pub fn children_resolved(&self) -> bool {
        self.children().iter().all(|c| c.resolved())
    }

    /// The node's own expressions, in evaluation-surface order.
    pub fn node_expressions(&self) -> Vec<&Expression> {
        match self {
            Plan::Project { exprs, .. } => exprs.iter().collect(),
            Plan::Filter { predicate, .. } => vec![predicate],
            Plan::Sort { fields, .. } => fields.iter().map(|f| &f.expr).collect(),
            Plan::GroupBy {
                aggregates,
                grouping,
                ..
            } => aggregates.iter().chain(grouping.iter()).collect(),
            Plan::InnerJoin { predicate, .. } => vec![predicate],
            _ => Vec::new(),
        }
    }

    /// Apply `f` to each direct child, rebuilding this node around the
    /// results.
    pub fn map_children<F>(self, f: &mut F) -> Result<Plan>
    where
        F: FnMut(Plan) -> Result<Plan>,
    {
        Ok(match self {
            Plan::IndexHint {
                lookup,
                indexes,
                child,
            } => Plan::IndexHint {
                lookup,
                indexes,
                child: Box::new(f(*child)?),
            },
            Plan::TableAlias { name, child } => Plan::TableAlias {
                name,
                child: Box::new(f(*child)?),
            },
            Plan::SubqueryAlias {
                name,
                schema,
                child,
            } => Plan::SubqueryAlias {
                name,
                schema,
                child: Box::new(f(*child)?),
            },
            Plan::Project { exprs, child } => Plan::Project {
                exprs,
                child: Box::new(f(*child)?),
            },
            Plan::Filter { predicate, child } => Plan::Filter {
                predicate,
                child: Box::new(f(*child)?),
            },
            Plan::Sort { fields, child } => Plan::Sort {
                fields,
                child: Box::new(f(*child)?),
            },
            Plan::GroupBy {
                aggregates,
                grouping,
                child,
            } => Plan::GroupBy {
                aggregates,
                grouping,
                child: Box::new(f(*child)?),
            },
            Plan::Distinct { child } => Plan::Distinct {
                child: Box::new(f(*child)?),
            },
            Plan::OrderedDistinct { child } => Plan::OrderedDistinct {
                child: Box::new(f(*child)?),
            },
            Plan::InnerJoin {
                left,
                right,
                predicate,
            } => Plan::InnerJoin {
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
                predicate,
            },
            Plan::CrossJoin { left, right } => Plan::CrossJoin {
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
            },
            Plan::NaturalJoin { left, right } => Plan::NaturalJoin {
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
            },
            leaf => leaf,
        })
    }

    /// Post-order rewrite: children are rebuilt first, then `f` sees the
    /// node carrying the rewritten children. A callback returning its
    /// input unchanged produces a structurally equal tree.
    pub fn transform_up<F>(self, f: &mut F) -> Result<Plan>
    where
        F: FnMut(Plan) -> Result<Plan>,
    {
        let rebuilt = self.map_children(&mut |child| child.transform_up(f))?;
        f(rebuilt)
    }

    /// Apply `f` bottom-up to every expression tree inside every plan
    /// node, visiting child plans before parents. Expressions stored
    /// inside scan carriers are already pushed down and stay untouched.
    pub fn transform_expressions_up<F>(self, f: &mut F) -> Result<Plan>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        let rebuilt = self.map_children(&mut |child| child.transform_expressions_up(f))?;
        rebuilt.transform_own_expressions(f)
    }

    /// Rewrite only this node's own expressions, bottom-up within each
    /// expression tree.
    pub fn transform_own_expressions<F>(self, f: &mut F) -> Result<Plan>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        Ok(match self {
            Plan::Project { exprs, child } => Plan::Project {
                exprs: exprs
                    .into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
                child,
            },
            Plan::Filter { predicate, child } => Plan::Filter {
                predicate: predicate.transform_up(f)?,
                child,
            },
            Plan::Sort { fields, child } => Plan::Sort {
                fields: fields
                    .into_iter()
                    .map(|sf| {
                        Ok(SortField {
                            expr: sf.expr.transform_up(f)?,
                            direction: sf.direction,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                child,
            },
            Plan::GroupBy {
                aggregates,
                grouping,
                child,
            } => Plan::GroupBy {
                aggregates: aggregates
                    .into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
                grouping: grouping
                    .into_iter()
                    .map(|e| e.transform_up(f))
                    .collect::<Result<Vec<_>>>()?,
                child,
            },
            Plan::InnerJoin {
                left,
                right,
                predicate,
            } => Plan::InnerJoin {
                left,
                right,
                predicate: predicate.transform_up(f)?,
            },
            other => other,
        })
    }
}
