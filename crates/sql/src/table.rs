use std::fmt;
use std::sync::Arc;

use riffle_common::Result;

use crate::expression::Expression;
use crate::schema::Schema;
use crate::value::Value;

/// What a storage backend can absorb from the plan above its scan.
/// Pushdown dispatches on this tag; capability is never probed through
/// downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Plain row source.
    Basic,
    /// Accepts a projected column-name list.
    ProjectionPushdown,
    /// Accepts projected column expressions plus a subset of filter
    /// conjuncts it reports through [`Table::handled_filters`].
    ProjectionAndFilterPushdown,
    /// Projection-and-filter pushdown plus index lookups.
    Indexable,
}

/// A relational row source registered in the catalog.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &Schema;

    fn capability(&self) -> Capability {
        Capability::Basic
    }

    /// Which of the candidate filter conjuncts the backend can evaluate
    /// internally. Only meaningful for the filter-pushdown capabilities.
    fn handled_filters(&self, _filters: &[Expression]) -> Vec<Expression> {
        Vec::new()
    }

    /// Full scan of the underlying rows.
    fn rows(&self) -> Result<Vec<Vec<Value>>>;
}

/// Shared handle to a table. Equality is identity first, then
/// name + schema, so a table fetched twice from the same catalog
/// compares equal without deep row comparison.
#[derive(Clone)]
pub struct TableRef(Arc<dyn Table>);

impl TableRef {
    pub fn new(table: impl Table + 'static) -> Self {
        Self(Arc::new(table))
    }

    pub fn from_arc(table: Arc<dyn Table>) -> Self {
        Self(table)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn schema(&self) -> &Schema {
        self.0.schema()
    }

    pub fn capability(&self) -> Capability {
        self.0.capability()
    }

    pub fn handled_filters(&self, filters: &[Expression]) -> Vec<Expression> {
        self.0.handled_filters(filters)
    }

    pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
        self.0.rows()
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableRef({})", self.0.name())
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.name() == other.name() && self.schema() == other.schema())
    }
}
