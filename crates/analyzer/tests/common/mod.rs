#![allow(dead_code)]

use std::any::Any;

use riffle_common::{Result, RiffleError};
use riffle_sql::{Expression, Index, IndexLookup, LookupRef, Plan, Value};

/// Lookup from a backend that supports the full set algebra. Union and
/// intersection record the combined lookup ids, which the tests assert
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeableLookup {
    pub id: String,
    pub unions: Vec<String>,
    pub intersections: Vec<String>,
}

impl MergeableLookup {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unions: Vec::new(),
            intersections: Vec::new(),
        }
    }

    pub fn with_unions(mut self, unions: &[&str]) -> Self {
        self.unions = unions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_intersections(mut self, intersections: &[&str]) -> Self {
        self.intersections = intersections.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn into_ref(self) -> LookupRef {
        LookupRef::new(self)
    }
}

impl IndexLookup for MergeableLookup {
    fn values(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    fn is_mergeable(&self, other: &dyn IndexLookup) -> bool {
        other.as_any().downcast_ref::<MergeableLookup>().is_some()
    }

    fn union(&self, others: &[LookupRef]) -> Option<LookupRef> {
        let mut unions = self.unions.clone();
        let mut intersections = self.intersections.clone();
        for o in others {
            let o = o.as_any().downcast_ref::<MergeableLookup>()?;
            unions.push(o.id.clone());
            unions.extend(o.unions.iter().cloned());
            intersections.extend(o.intersections.iter().cloned());
        }
        Some(LookupRef::new(MergeableLookup {
            id: self.id.clone(),
            unions,
            intersections,
        }))
    }

    fn intersection(&self, others: &[LookupRef]) -> Option<LookupRef> {
        let mut unions = self.unions.clone();
        let mut intersections = self.intersections.clone();
        for o in others {
            let o = o.as_any().downcast_ref::<MergeableLookup>()?;
            intersections.push(o.id.clone());
            intersections.extend(o.intersections.iter().cloned());
            unions.extend(o.unions.iter().cloned());
        }
        Some(LookupRef::new(MergeableLookup {
            id: self.id.clone(),
            unions,
            intersections,
        }))
    }

    fn lookup_eq(&self, other: &dyn IndexLookup) -> bool {
        other.as_any().downcast_ref::<MergeableLookup>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lookup from a backend without set-operation support.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainLookup;

impl IndexLookup for PlainLookup {
    fn values(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    fn lookup_eq(&self, other: &dyn IndexLookup) -> bool {
        other.as_any().downcast_ref::<PlainLookup>().is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Catalog index whose single-key lookups are [`MergeableLookup`]s keyed
/// by the rendered key value.
#[derive(Debug)]
pub struct TestIndex {
    pub id: String,
    pub database: String,
    pub table: String,
    pub expr: Expression,
    pub mergeable: bool,
}

impl TestIndex {
    pub fn new(id: &str, table: &str, expr: Expression) -> Self {
        Self {
            id: id.to_string(),
            database: "mydb".to_string(),
            table: table.to_string(),
            expr,
            mergeable: true,
        }
    }

    pub fn unmergeable(mut self) -> Self {
        self.mergeable = false;
        self
    }
}

impl Index for TestIndex {
    fn id(&self) -> &str {
        &self.id
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn expression(&self) -> &Expression {
        &self.expr
    }

    fn get(&self, key: &Value) -> Result<LookupRef> {
        if self.mergeable {
            Ok(LookupRef::new(MergeableLookup::id(key.to_string())))
        } else {
            Ok(LookupRef::new(PlainLookup))
        }
    }
}

/// Reference row-at-a-time evaluation, enough to check that pushdown
/// preserves the emitted row set. Carrier scans keep their full-width
/// rows (their schema stays the wrapped table's schema); pushed filters
/// are applied against those rows.
pub fn eval_plan(plan: &Plan) -> Result<Vec<Vec<Value>>> {
    match plan {
        Plan::Table { table } | Plan::ProjectedTable { table, .. } => table.rows(),
        Plan::FilteredTable { filters, table, .. }
        | Plan::IndexedTable { filters, table, .. } => {
            let mut out = Vec::new();
            for row in table.rows()? {
                if eval_all(filters, &row)? {
                    out.push(row);
                }
            }
            Ok(out)
        }
        Plan::IndexHint { child, .. }
        | Plan::TableAlias { child, .. }
        | Plan::SubqueryAlias { child, .. } => eval_plan(child),
        Plan::Filter { predicate, child } => {
            let mut out = Vec::new();
            for row in eval_plan(child)? {
                if eval_all(std::slice::from_ref(predicate), &row)? {
                    out.push(row);
                }
            }
            Ok(out)
        }
        Plan::Project { exprs, child } => {
            let mut out = Vec::new();
            for row in eval_plan(child)? {
                let projected = exprs
                    .iter()
                    .map(|e| e.eval(&row))
                    .collect::<Result<Vec<_>>>()?;
                out.push(projected);
            }
            Ok(out)
        }
        Plan::CrossJoin { left, right } => {
            let mut out = Vec::new();
            for l in eval_plan(left)? {
                for r in eval_plan(right)? {
                    let mut row = l.clone();
                    row.extend(r.iter().cloned());
                    out.push(row);
                }
            }
            Ok(out)
        }
        Plan::InnerJoin {
            left,
            right,
            predicate,
        } => {
            let mut out = Vec::new();
            for l in eval_plan(left)? {
                for r in eval_plan(right)? {
                    let mut row = l.clone();
                    row.extend(r.iter().cloned());
                    if eval_all(std::slice::from_ref(predicate), &row)? {
                        out.push(row);
                    }
                }
            }
            Ok(out)
        }
        other => Err(RiffleError::InvalidPlan(format!(
            "reference evaluation does not cover {other:?}"
        ))),
    }
}

fn eval_all(exprs: &[Expression], row: &[Value]) -> Result<bool> {
    for e in exprs {
        if e.eval(row)? != Value::Boolean(true) {
            return Ok(false);
        }
    }
    Ok(true)
}
