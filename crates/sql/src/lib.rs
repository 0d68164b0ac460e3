//! Core model for the riffle query-plan analyzer.
//!
//! Architecture role:
//! - scalar values and the expression algebra plan nodes evaluate
//! - the relational plan algebra, including table-scan capability
//!   carriers, with immutable bottom-up rewriting
//! - schemas with table-origin tags backing positional resolution
//! - the catalog: databases, tables, scalar functions, and the index
//!   registry with asynchronous readiness
//! - session context with cancellation
//!
//! Key modules:
//! - [`expression`]
//! - [`plan`]
//! - [`schema`]
//! - [`catalog`]
//! - [`index`]
//! - [`table`] / [`mem`]
//! - [`explain`]

pub mod catalog;
pub mod context;
pub mod explain;
pub mod expression;
pub mod index;
pub mod mem;
pub mod plan;
pub mod schema;
pub mod table;
pub mod value;

pub use catalog::{Catalog, Database};
pub use context::Context;
pub use explain::explain_plan;
pub use expression::{ArithmeticOp, CompareOp, Expression, FieldRef, FunctionRef, ScalarFn};
pub use index::{
    Index, IndexLookup, IndexRef, IndexRegistration, IndexRegistry, LookupRef, ReleasingLookup,
};
pub use mem::{FilterSupport, MemTable};
pub use plan::{Plan, SortDirection, SortField};
pub use schema::{Column, Schema};
pub use table::{Capability, Table, TableRef};
pub use value::Value;
