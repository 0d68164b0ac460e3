#![deny(missing_docs)]

//! Shared configuration and error types for riffle crates.
//!
//! Architecture role:
//! - provides the common [`RiffleError`] / [`Result`] contracts
//! - defines analyzer/session configuration passed across layers
//!
//! Key modules:
//! - [`config`]
//! - [`error`]

/// Shared analyzer/session configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;

pub use config::AnalyzerConfig;
pub use error::{Result, RiffleError};
