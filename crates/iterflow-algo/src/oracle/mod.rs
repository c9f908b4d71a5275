//! Optimization oracles.
//!
//! The assignment engine never solves LPs itself. It hands a
//! [`LinearProgram`] to an [`OptimizationOracle`] and consumes the primal
//! values and termination status that come back.
//!
//! | Backend | Implementation | Feature |
//! |---------|----------------|---------|
//! | `clarabel` | Clarabel interior point, native conic API | always |
//! | `good_lp` | Clarabel through the `good_lp` modeling layer | `solver-clarabel` (default) |
//! | `highs` | HiGHS dual simplex through `good_lp` | `solver-highs` |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::error::AssignmentError;
use crate::lp::LinearProgram;

mod clarabel;
#[cfg(any(feature = "solver-clarabel", feature = "solver-highs"))]
mod modeler;

pub use self::clarabel::ClarabelOracle;
#[cfg(any(feature = "solver-clarabel", feature = "solver-highs"))]
pub use self::modeler::{GoodLpOracle, ModelerSolver};

/// Termination status reported by an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Timeout,
    Unknown,
}

impl OracleStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, OracleStatus::Optimal)
    }
}

impl std::fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleStatus::Optimal => write!(f, "optimal"),
            OracleStatus::Infeasible => write!(f, "infeasible"),
            OracleStatus::Unbounded => write!(f, "unbounded"),
            OracleStatus::Timeout => write!(f, "timeout"),
            OracleStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleSolution {
    pub status: OracleStatus,
    /// Primal values indexed by [`crate::lp::VarId::index`]
    pub primal: Option<Vec<f64>>,
    pub solve_time: Duration,
    /// Backend-specific detail (raw status, error message)
    pub message: Option<String>,
}

impl OracleSolution {
    pub fn new(status: OracleStatus, primal: Option<Vec<f64>>, solve_time: Duration) -> Self {
        Self {
            status,
            primal,
            solve_time,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Optimal, or timed out with an incumbent.
    pub fn is_usable(&self) -> bool {
        match self.status {
            OracleStatus::Optimal => self.primal.is_some(),
            OracleStatus::Timeout => self.primal.is_some(),
            _ => false,
        }
    }
}

/// An external LP solver.
pub trait OptimizationOracle: Send + Sync {
    /// Unique identifier (e.g., "clarabel", "highs")
    fn id(&self) -> &str;

    /// Wall-clock limit handed to the backend, if any.
    fn time_limit(&self) -> Option<Duration> {
        None
    }

    /// Solve `lp`, blocking until the backend returns.
    ///
    /// Solver verdicts (infeasible, timeout, ...) are reported through
    /// [`OracleSolution::status`]; `Err` means the backend could not be run.
    fn solve(&self, lp: &LinearProgram) -> Result<OracleSolution, AssignmentError>;
}

/// Oracle selection by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OracleBackend {
    #[default]
    Clarabel,
    #[cfg(feature = "solver-clarabel")]
    GoodLp,
    #[cfg(feature = "solver-highs")]
    Highs,
}

const AVAILABLE_BACKENDS: &[&str] = &[
    "clarabel",
    #[cfg(feature = "solver-clarabel")]
    "good_lp",
    #[cfg(feature = "solver-highs")]
    "highs",
];

impl OracleBackend {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_BACKENDS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleBackend::Clarabel => "clarabel",
            #[cfg(feature = "solver-clarabel")]
            OracleBackend::GoodLp => "good_lp",
            #[cfg(feature = "solver-highs")]
            OracleBackend::Highs => "highs",
        }
    }
}

fn unknown_backend_error(label: &str) -> AssignmentError {
    AssignmentError::Config(format!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        OracleBackend::available().join(", ")
    ))
}

impl FromStr for OracleBackend {
    type Err = AssignmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "clarabel" => Ok(OracleBackend::Clarabel),
            "good_lp" | "goodlp" => {
                #[cfg(feature = "solver-clarabel")]
                {
                    Ok(OracleBackend::GoodLp)
                }
                #[cfg(not(feature = "solver-clarabel"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(OracleBackend::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_backend_error(&normalized))
                }
            }
            other => Err(unknown_backend_error(other)),
        }
    }
}

/// Instantiate the oracle named in `config`.
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn OptimizationOracle>, AssignmentError> {
    let backend: OracleBackend = config.backend.parse()?;
    let timeout = (config.timeout_seconds > 0).then(|| Duration::from_secs(config.timeout_seconds));
    let oracle: Arc<dyn OptimizationOracle> = match backend {
        OracleBackend::Clarabel => Arc::new(
            ClarabelOracle::new()
                .with_time_limit(timeout)
                .with_verbose(config.verbose),
        ),
        #[cfg(feature = "solver-clarabel")]
        OracleBackend::GoodLp => Arc::new(
            GoodLpOracle::new(ModelerSolver::Clarabel)
                .with_time_limit(timeout)
                .with_verbose(config.verbose),
        ),
        #[cfg(feature = "solver-highs")]
        OracleBackend::Highs => Arc::new(
            GoodLpOracle::new(ModelerSolver::Highs)
                .with_time_limit(timeout)
                .with_verbose(config.verbose),
        ),
    };
    Ok(oracle)
}
