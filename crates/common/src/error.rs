use thiserror::Error;

/// Canonical riffle error taxonomy used across crates.
///
/// Classification guidance:
/// - name-resolution kinds ([`RiffleError::TableNotFound`],
///   [`RiffleError::ColumnNotFound`], [`RiffleError::AmbiguousColumnName`],
///   [`RiffleError::FunctionNotFound`]) surface from individual analyzer rules
/// - [`RiffleError::OrderByColumnIndex`]: ORDER BY ordinal outside the child schema
/// - [`RiffleError::MaxAnalysisIters`]: the rule pipeline never reached a fixed point
/// - [`RiffleError::InvalidPlan`]: structurally malformed trees (for example a
///   field index outside its input schema)
/// - [`RiffleError::Cancelled`]: the session context was cancelled between rule
///   iterations
/// - [`RiffleError::InvalidConfig`] / [`RiffleError::Io`]: configuration contract
///   violations and raw filesystem failures while loading it
#[derive(Debug, Error)]
pub enum RiffleError {
    /// A table reference could not be resolved in the current database.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A qualified column is not part of the node's input schema.
    #[error("column \"{1}\" not found in table \"{0}\"")]
    ColumnNotFound(String, String),

    /// A bare column name is defined by more than one table in scope.
    #[error("ambiguous column name \"{0}\"")]
    AmbiguousColumnName(String),

    /// An ORDER BY position literal is outside the child schema.
    #[error("ORDER BY position {0} is out of range (schema has {1} columns)")]
    OrderByColumnIndex(i64, usize),

    /// A database reference could not be resolved in the catalog.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// A function call names no registered scalar function.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// The analyzer exceeded its iteration bound without reaching a fixed point.
    #[error("exceeded maximum analysis iterations ({0})")]
    MaxAnalysisIters(usize),

    /// Catch-all for malformed plan trees.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The session context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard riffle result alias.
pub type Result<T> = std::result::Result<T, RiffleError>;
