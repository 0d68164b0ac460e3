use riffle_common::Result;

use crate::expression::Expression;
use crate::schema::{Column, Schema};
use crate::table::{Capability, Table};
use crate::value::Value;

/// Which filter conjuncts a [`MemTable`] reports as handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSupport {
    /// Reject every candidate.
    None,
    /// Accept only resolved equality comparisons.
    EqualityOnly,
    /// Accept every resolved candidate.
    All,
}

/// In-memory table used by tests and reference evaluation. Defaults to
/// the projection-and-filter pushdown capability accepting every
/// resolved filter, which matches what a capable storage backend
/// advertises; tests narrow it per scenario.
#[derive(Debug)]
pub struct MemTable {
    name: String,
    schema: Schema,
    rows: Vec<Vec<Value>>,
    capability: Capability,
    filter_support: FilterSupport,
}

impl MemTable {
    /// Create an empty table. Columns without a source tag are tagged
    /// with the table name so positional resolution can match them.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let schema = columns
            .into_iter()
            .map(|c| {
                if c.source.is_empty() {
                    Column::new(c.name, c.data_type, name.clone(), c.nullable)
                } else {
                    c
                }
            })
            .collect();
        Self {
            name,
            schema,
            rows: Vec::new(),
            capability: Capability::ProjectionAndFilterPushdown,
            filter_support: FilterSupport::All,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_filter_support(mut self, filter_support: FilterSupport) -> Self {
        self.filter_support = filter_support;
        self
    }
}

impl Table for MemTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn handled_filters(&self, filters: &[Expression]) -> Vec<Expression> {
        filters
            .iter()
            .filter(|f| {
                f.resolved()
                    && match self.filter_support {
                        FilterSupport::None => false,
                        FilterSupport::EqualityOnly => matches!(
                            f,
                            Expression::Compare {
                                op: crate::expression::CompareOp::Eq,
                                ..
                            }
                        ),
                        FilterSupport::All => true,
                    }
            })
            .cloned()
            .collect()
    }

    fn rows(&self) -> Result<Vec<Vec<Value>>> {
        Ok(self.rows.clone())
    }
}
