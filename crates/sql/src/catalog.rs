use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::DataType;

use riffle_common::{Result, RiffleError};

use crate::expression::{Expression, FunctionRef};
use crate::index::{IndexRef, IndexRegistration, IndexRegistry};
use crate::table::TableRef;
use crate::value::Value;

/// A named collection of tables.
#[derive(Default)]
pub struct Database {
    name: String,
    tables: HashMap<String, TableRef>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_table(&mut self, table: TableRef) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<TableRef> {
        self.tables.get(name).cloned()
    }

    /// Tables sorted by name for deterministic listings.
    pub fn tables(&self) -> Vec<TableRef> {
        let mut v: Vec<TableRef> = self.tables.values().cloned().collect();
        v.sort_by(|a, b| a.name().cmp(b.name()));
        v
    }
}

/// Name-resolution surface for databases, tables, scalar functions, and
/// indexes. Shared across concurrent analyses; interior locking keeps
/// readers cheap.
#[derive(Default)]
pub struct Catalog {
    databases: RwLock<Vec<Arc<Database>>>,
    functions: RwLock<HashMap<String, FunctionRef>>,
    indexes: IndexRegistry,
}

impl Catalog {
    /// Empty catalog with the built-in scalar functions registered.
    pub fn new() -> Self {
        let catalog = Self::default();
        for (name, f) in builtin_functions() {
            catalog.register_function(name, f);
        }
        catalog
    }

    pub fn add_database(&self, db: Database) {
        let mut dbs = self
            .databases
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dbs.push(Arc::new(db));
    }

    /// Databases sorted by name.
    pub fn databases(&self) -> Vec<Arc<Database>> {
        let dbs = self
            .databases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut v = dbs.clone();
        v.sort_by(|a, b| a.name().cmp(b.name()));
        v
    }

    pub fn database(&self, name: &str) -> Result<Arc<Database>> {
        let dbs = self
            .databases
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dbs.iter()
            .find(|db| db.name() == name)
            .cloned()
            .ok_or_else(|| RiffleError::DatabaseNotFound(name.to_string()))
    }

    pub fn table(&self, db: &str, name: &str) -> Result<TableRef> {
        let database = self.database(db)?;
        database
            .table(name)
            .ok_or_else(|| RiffleError::TableNotFound(name.to_string()))
    }

    pub fn register_function(&self, name: impl Into<String>, function: FunctionRef) {
        let name: String = name.into();
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        functions.insert(name.to_ascii_lowercase(), function);
    }

    pub fn function(&self, name: &str) -> Result<FunctionRef> {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        functions
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RiffleError::FunctionNotFound(name.to_string()))
    }

    /// Register an index as pending; see [`IndexRegistry::add_index`].
    pub fn add_index(&self, index: IndexRef) -> Result<IndexRegistration> {
        self.indexes.add_index(index)
    }

    pub fn indexes_by_table(&self, db: &str, table: &str) -> Vec<IndexRef> {
        self.indexes.indexes_by_table(db, table)
    }

    pub fn index_by_expression(&self, db: &str, expr: &Expression) -> Option<IndexRef> {
        self.indexes.index_by_expression(db, expr)
    }

    pub fn release_index(&self, index: &IndexRef) {
        self.indexes.release_index(index)
    }
}

fn builtin_functions() -> Vec<(&'static str, FunctionRef)> {
    vec![
        (
            "upper",
            FunctionRef::new(
                "upper",
                DataType::Utf8,
                Arc::new(|args: &[Value]| match args {
                    [Value::Utf8(s)] => Ok(Value::Utf8(s.to_uppercase())),
                    [Value::Null] => Ok(Value::Null),
                    _ => Err(RiffleError::InvalidPlan(
                        "upper takes one string argument".to_string(),
                    )),
                }),
            ),
        ),
        (
            "length",
            FunctionRef::new(
                "length",
                DataType::Int64,
                Arc::new(|args: &[Value]| match args {
                    [Value::Utf8(s)] => Ok(Value::Int64(s.chars().count() as i64)),
                    [Value::Null] => Ok(Value::Null),
                    _ => Err(RiffleError::InvalidPlan(
                        "length takes one string argument".to_string(),
                    )),
                }),
            ),
        ),
    ]
}
