//! Unified error types for the iterflow workspace
//!
//! This module provides a common error type [`IterflowError`] that can represent
//! errors from any part of the system. Domain-specific error types (for example
//! the assignment engine's `AssignmentError`) convert into `IterflowError` for
//! uniform handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use iterflow_core::{IterflowError, IterflowResult};
//!
//! fn run(path: &str) -> IterflowResult<()> {
//!     let scenario = load_scenario(path)?;
//!     assign(&scenario)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all iterflow operations.
#[derive(Error, Debug)]
pub enum IterflowError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors (unknown nodes, duplicate links)
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using IterflowError.
pub type IterflowResult<T> = Result<T, IterflowError>;

impl From<anyhow::Error> for IterflowError {
    fn from(err: anyhow::Error) -> Self {
        IterflowError::Other(err.to_string())
    }
}

impl From<String> for IterflowError {
    fn from(s: String) -> Self {
        IterflowError::Other(s)
    }
}

impl From<&str> for IterflowError {
    fn from(s: &str) -> Self {
        IterflowError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for IterflowError {
    fn from(err: serde_json::Error) -> Self {
        IterflowError::Parse(err.to_string())
    }
}
