use std::time::Duration;

use iterflow_core::IterflowError;
use thiserror::Error;

/// Assignment engine errors
#[derive(Debug, Clone, Error)]
pub enum AssignmentError {
    /// Input data validation error
    #[error("assignment data validation: {0}")]
    DataValidation(String),

    /// No trip produced a single feasible option
    #[error("no feasible options: {0}")]
    NoOptions(String),

    /// Oracle proved the model infeasible (indicates a data or modeling bug)
    #[error("assignment model infeasible: {0}")]
    Infeasible(String),

    /// Oracle proved the model unbounded
    #[error("assignment model unbounded")]
    Unbounded,

    /// Oracle ran out of time without an incumbent
    #[error("oracle timeout after {0:?}")]
    SolverTimeout(Duration),

    /// Numerical trouble inside the oracle
    #[error("numerical issue: {0}")]
    NumericalIssue(String),

    /// Oracle could not be built or invoked
    #[error("oracle failure: {0}")]
    OracleFailure(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<AssignmentError> for IterflowError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::DataValidation(msg) | AssignmentError::NoOptions(msg) => {
                IterflowError::Validation(msg)
            }
            AssignmentError::Config(msg) => IterflowError::Config(msg),
            other => IterflowError::Solver(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_workspace_error() {
        let err: IterflowError = AssignmentError::Config("gamma < 0".into()).into();
        assert!(matches!(err, IterflowError::Config(_)));

        let err: IterflowError = AssignmentError::Unbounded.into();
        assert!(matches!(err, IterflowError::Solver(_)));
        assert!(err.to_string().contains("unbounded"));
    }
}
