//! # iterflow-algo: Iterative Time-Dependent Assignment
//!
//! Assigns trip demand to (path, departure slot) options on a time-expanded
//! road network. Each iteration builds a linear program whose objective is a
//! piecewise-linear Beckmann potential, hands it to an external LP solver,
//! and re-estimates link travel times from the solved flows. The loop stops
//! when total system travel time (TSTT) settles or the iteration limit is hit.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Duration calculation | [`expansion`] | slots occupied per link |
//! | Option generation | [`options`] | feasible (trip, path, slot) triples and cell incidence |
//! | PWL approximation | [`pwl`] | convex segments per link |
//! | Model assembly | [`assembler`] | a [`lp::LinearProgram`] and its variable layout |
//! | Solve | [`oracle`] | primal values and a termination status |
//! | Extraction | [`results`] | TSTT, assignment records, link statistics |
//! | Re-estimation | [`estimator`] | travel times for the next iteration |
//!
//! [`IterationController`] strings these together and reports a
//! [`TerminalState`].
//!
//! ### Oracles
//!
//! The assembler never touches a solver crate. Backends implement
//! [`OptimizationOracle`]; [`build_oracle`] picks one by name.
//!
//! ## Example
//!
//! ```ignore
//! use iterflow_algo::{AssignmentConfig, IterationController, TerminalState};
//!
//! let controller = IterationController::from_config(AssignmentConfig::default())?;
//! let outcome = controller.run(&scenario)?;
//! if outcome.terminal == TerminalState::SolveFailed {
//!     eprintln!("{:?}", outcome.failure);
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod expansion;
pub mod lp;
pub mod options;
pub mod oracle;
pub mod pwl;
pub mod results;
pub mod scaling;

pub use assembler::{EquilibriumAssembler, EquilibriumModel, ModelInputs};
pub use config::{AssignmentConfig, FlowAveraging, OracleConfig};
pub use controller::{relative_change, AssignmentOutcome, IterationController, TerminalState};
pub use error::AssignmentError;
pub use estimator::{estimate_travel_times, CongestionReport};
pub use expansion::{free_flow_times, TimeExpansion, TravelTimes};
pub use options::{generate_options, AssignmentOption, OptionKey, OptionRules, OptionSet};
#[cfg(any(feature = "solver-clarabel", feature = "solver-highs"))]
pub use oracle::GoodLpOracle;
pub use oracle::{
    build_oracle, ClarabelOracle, OptimizationOracle, OracleBackend, OracleSolution, OracleStatus,
};
pub use results::{
    AssignmentRecord, CellFlows, ConvergenceRecord, Iterate, IterationSummary, LinkStatistics,
    OverallStatistics,
};
