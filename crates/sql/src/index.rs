use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use riffle_common::Result;

use crate::expression::Expression;
use crate::value::Value;

/// An opaque handle identifying the rows an index matched. Backends that
/// support combining lookups implement the set-operation methods and
/// report mergeability; the analyzer never inspects lookup internals.
pub trait IndexLookup: fmt::Debug + Send + Sync {
    /// Row keys for the executor.
    fn values(&self) -> Result<Vec<Value>>;

    /// Whether `other` comes from the same backend and can be combined
    /// with this lookup through the set operations.
    fn is_mergeable(&self, _other: &dyn IndexLookup) -> bool {
        false
    }

    /// N-way union with `others`. `None` when unsupported.
    fn union(&self, _others: &[LookupRef]) -> Option<LookupRef> {
        None
    }

    /// N-way intersection with `others`. `None` when unsupported.
    fn intersection(&self, _others: &[LookupRef]) -> Option<LookupRef> {
        None
    }

    /// N-way difference with `others`. `None` when unsupported.
    fn difference(&self, _others: &[LookupRef]) -> Option<LookupRef> {
        None
    }

    /// Structural equality against another lookup, used by plan equality
    /// and therefore by fixed-point detection.
    fn lookup_eq(&self, other: &dyn IndexLookup) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an [`IndexLookup`].
#[derive(Clone, Debug)]
pub struct LookupRef(Arc<dyn IndexLookup>);

impl LookupRef {
    pub fn new(lookup: impl IndexLookup + 'static) -> Self {
        Self(Arc::new(lookup))
    }

    pub fn from_arc(lookup: Arc<dyn IndexLookup>) -> Self {
        Self(lookup)
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.0.values()
    }

    pub fn is_mergeable(&self, other: &LookupRef) -> bool {
        self.0.is_mergeable(other.0.as_ref())
    }

    pub fn union(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.0.union(others)
    }

    pub fn intersection(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.0.intersection(others)
    }

    pub fn difference(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.0.difference(others)
    }

    pub fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }

    pub fn as_dyn(&self) -> &dyn IndexLookup {
        self.0.as_ref()
    }
}

impl PartialEq for LookupRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.lookup_eq(other.0.as_ref())
    }
}

/// Lookup wrapper that fires a cleanup callback exactly once, when the
/// last plan holding the lookup is dropped. Equality and merge behavior
/// delegate to the wrapped lookup, ignoring the callback.
pub struct ReleasingLookup {
    inner: LookupRef,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ReleasingLookup {
    pub fn new(inner: LookupRef, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Wrapper without a callback; useful for building expected plans in
    /// tests.
    pub fn without_release(inner: LookupRef) -> Self {
        Self {
            inner,
            release: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &LookupRef {
        &self.inner
    }

    fn unwrap_other<'a>(other: &'a dyn IndexLookup) -> &'a dyn IndexLookup {
        match other.as_any().downcast_ref::<ReleasingLookup>() {
            Some(r) => r.inner.as_dyn(),
            None => other,
        }
    }
}

impl fmt::Debug for ReleasingLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleasingLookup")
            .field("inner", &self.inner)
            .finish()
    }
}

impl Drop for ReleasingLookup {
    fn drop(&mut self) {
        let cb = self.release.lock().ok().and_then(|mut g| g.take());
        if let Some(cb) = cb {
            cb();
        }
    }
}

impl IndexLookup for ReleasingLookup {
    fn values(&self) -> Result<Vec<Value>> {
        self.inner.values()
    }

    fn is_mergeable(&self, other: &dyn IndexLookup) -> bool {
        self.inner.as_dyn().is_mergeable(Self::unwrap_other(other))
    }

    fn union(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.inner.union(others)
    }

    fn intersection(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.inner.intersection(others)
    }

    fn difference(&self, others: &[LookupRef]) -> Option<LookupRef> {
        self.inner.difference(others)
    }

    fn lookup_eq(&self, other: &dyn IndexLookup) -> bool {
        self.inner.as_dyn().lookup_eq(Self::unwrap_other(other))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A catalog-registered index over a single table expression.
pub trait Index: fmt::Debug + Send + Sync {
    /// Stable identifier, unique within the database.
    fn id(&self) -> &str;

    fn database(&self) -> &str;

    /// Table the index lives on.
    fn table(&self) -> &str;

    /// The indexed expression, matched against filter columns by its
    /// canonical rendering.
    fn expression(&self) -> &Expression;

    /// Single-key lookup.
    fn get(&self, key: &Value) -> Result<LookupRef>;
}

/// Shared handle to an [`Index`].
#[derive(Clone, Debug)]
pub struct IndexRef(Arc<dyn Index>);

impl IndexRef {
    pub fn new(index: impl Index + 'static) -> Self {
        Self(Arc::new(index))
    }

    pub fn from_arc(index: Arc<dyn Index>) -> Self {
        Self(index)
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    pub fn database(&self) -> &str {
        self.0.database()
    }

    pub fn table(&self) -> &str {
        self.0.table()
    }

    pub fn expression(&self) -> &Expression {
        self.0.expression()
    }

    pub fn get(&self, key: &Value) -> Result<LookupRef> {
        self.0.get(key)
    }
}

impl PartialEq for IndexRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.id() == other.id()
                && self.database() == other.database()
                && self.table() == other.table())
    }
}

/// Completion signal returned by index registration. The index stays
/// pending, invisible to expression matching, until `complete` is called
/// by whoever finishes building the underlying index.
#[must_use = "the index stays pending until complete() is called"]
pub struct IndexRegistration {
    ready: Arc<AtomicBool>,
}

impl IndexRegistration {
    pub fn complete(self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

struct RegisteredIndex {
    index: IndexRef,
    ready: Arc<AtomicBool>,
}

impl RegisteredIndex {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Registry of indexes with asynchronous readiness. Safe for concurrent
/// readers with a writer; reads take a snapshot under the lock.
#[derive(Default)]
pub struct IndexRegistry {
    entries: RwLock<Vec<RegisteredIndex>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index as pending and hand back its completion signal.
    pub fn add_index(&self, index: IndexRef) -> Result<IndexRegistration> {
        let ready = Arc::new(AtomicBool::new(false));
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push(RegisteredIndex {
            index,
            ready: Arc::clone(&ready),
        });
        Ok(IndexRegistration { ready })
    }

    /// Ready indexes on a table, registration order.
    pub fn indexes_by_table(&self, db: &str, table: &str) -> Vec<IndexRef> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .iter()
            .filter(|e| e.is_ready() && e.index.database() == db && e.index.table() == table)
            .map(|e| e.index.clone())
            .collect()
    }

    /// First ready index whose indexed expression renders the same as
    /// `expr`. Pending indexes are treated as absent.
    pub fn index_by_expression(&self, db: &str, expr: &Expression) -> Option<IndexRef> {
        let key = expr.to_string();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .iter()
            .filter(|e| e.is_ready() && e.index.database() == db)
            .find(|e| e.index.expression().to_string() == key)
            .map(|e| e.index.clone())
    }

    /// Unregister an index.
    pub fn release_index(&self, index: &IndexRef) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|e| e.index != *index);
    }
}
