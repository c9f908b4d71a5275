//! Fixed-point iteration over build, solve, extract and check.
//!
//! Every iteration rebuilds the whole model from the travel-time map produced
//! by the previous one. Nothing else crosses iteration boundaries.

use std::sync::Arc;

use iterflow_core::{BackgroundTraffic, Network, Scenario};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assembler::{EquilibriumAssembler, ModelInputs};
use crate::config::AssignmentConfig;
use crate::error::AssignmentError;
use crate::estimator::{estimate_travel_times, CongestionReport};
use crate::expansion::{free_flow_times, TimeExpansion, TravelTimes};
use crate::options::{generate_options, OptionRules};
use crate::oracle::{build_oracle, OptimizationOracle, OracleSolution, OracleStatus};
use crate::results::{
    assignment_records, extract, link_statistics, ConvergenceRecord, Iterate, IterationSummary,
    OverallStatistics,
};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Converged,
    IterationLimit,
    SolveFailed,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Converged => write!(f, "CONVERGED"),
            TerminalState::IterationLimit => write!(f, "ITERATION_LIMIT"),
            TerminalState::SolveFailed => write!(f, "SOLVE_FAILED"),
        }
    }
}

/// Result of [`IterationController::run`].
///
/// Check [`AssignmentOutcome::terminal`] before trusting `final_iterate`:
/// after a failed solve it holds the last usable iterate, if any.
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub terminal: TerminalState,
    pub iterations: Vec<IterationSummary>,
    pub trace: Vec<ConvergenceRecord>,
    pub final_iterate: Option<Iterate>,
    /// Why the run stopped, when it stopped on a failure
    pub failure: Option<AssignmentError>,
}

impl AssignmentOutcome {
    fn new() -> Self {
        Self {
            terminal: TerminalState::IterationLimit,
            iterations: Vec::new(),
            trace: Vec::new(),
            final_iterate: None,
            failure: None,
        }
    }

    fn finish(mut self, terminal: TerminalState) -> Self {
        self.terminal = terminal;
        self
    }

    fn fail(mut self, error: AssignmentError) -> Self {
        warn!(error = %error, "assignment run aborted");
        self.terminal = TerminalState::SolveFailed;
        self.failure = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.terminal != TerminalState::SolveFailed
    }

    /// Summary of the last usable iteration.
    pub fn last_summary(&self) -> Option<&IterationSummary> {
        self.iterations.last()
    }
}

/// `|current − previous| / previous`.
///
/// A zero previous value yields 0 when the current value is also zero and
/// infinity otherwise.
pub fn relative_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (current - previous).abs() / previous.abs()
    }
}

/// Drives the assignment loop with one oracle.
pub struct IterationController {
    config: AssignmentConfig,
    oracle: Arc<dyn OptimizationOracle>,
}

impl IterationController {
    pub fn new(config: AssignmentConfig, oracle: Arc<dyn OptimizationOracle>) -> Self {
        Self { config, oracle }
    }

    /// Controller using the oracle named in `config.oracle`.
    pub fn from_config(config: AssignmentConfig) -> Result<Self, AssignmentError> {
        let oracle = build_oracle(&config.oracle)?;
        Ok(Self::new(config, oracle))
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    pub fn oracle_id(&self) -> &str {
        self.oracle.id()
    }

    /// Scale background traffic and clip it below the utilization ceiling.
    pub fn prepare_background(
        &self,
        network: &Network,
        background: &BackgroundTraffic,
    ) -> BackgroundTraffic {
        let u_max = self.config.utilization_ceiling();
        let margin = self.config.background_margin;
        let clipped = background
            .scaled(self.config.background_scale)
            .clipped(network, |link| u_max * link.capacity_per_slot - margin);
        if clipped.clipped_cells > 0 || clipped.unknown_links > 0 {
            warn!(
                clipped_cells = clipped.clipped_cells,
                unknown_links = clipped.unknown_links,
                "background traffic adjusted"
            );
        }
        debug!(
            links = clipped.traffic.link_count(),
            total = clipped.traffic.total(),
            scale = self.config.background_scale,
            "background traffic prepared"
        );
        clipped.traffic
    }

    /// Run the loop until convergence, the iteration limit, or a failed solve.
    ///
    /// `Err` is returned only for configuration errors and oracle setup
    /// failures detected before the first iteration.
    pub fn run(&self, scenario: &Scenario) -> Result<AssignmentOutcome, AssignmentError> {
        let cfg = &self.config;
        cfg.validate()?;

        let network = &scenario.network;
        let trips = scenario.trips.as_slice();
        let background = self.prepare_background(network, &scenario.background);
        let assembler = EquilibriumAssembler::new(cfg.clone());
        let rules = OptionRules::from(cfg);
        let total_demand = scenario.total_demand();

        info!(
            oracle = self.oracle.id(),
            links = network.link_count(),
            trips = trips.len(),
            demand = total_demand,
            horizon = cfg.horizon_slots,
            max_iterations = cfg.max_iterations,
            "starting assignment"
        );

        let mut outcome = AssignmentOutcome::new();
        let mut times: TravelTimes = free_flow_times(network);
        let mut previous_expansion: Option<TimeExpansion> = None;
        let mut previous_tstt: Option<f64> = None;

        for iteration in 1..=cfg.max_iterations {
            // BUILD
            let expansion = TimeExpansion::new(network, &times, cfg.slot_minutes);
            if let Some(previous) = &previous_expansion {
                debug!(
                    iteration,
                    changed_links = expansion.changed_since(previous),
                    "slot durations updated"
                );
            }
            let options = generate_options(network, trips, &times, &expansion, rules);
            info!(
                iteration,
                options = options.len(),
                rejected = %options.rejected,
                trips_without_options = options.trips_without_options.len(),
                "options generated"
            );

            let model = match assembler.build(ModelInputs {
                network,
                trips,
                background: &background,
                options: &options,
                expansion: &expansion,
            }) {
                Ok(model) => model,
                Err(err @ AssignmentError::Config(_)) => return Err(err),
                Err(err) => return Ok(outcome.fail(err)),
            };
            info!(
                iteration,
                variables = model.lp.num_variables(),
                constraints = model.lp.num_constraints(),
                nonzeros = model.lp.num_nonzeros(),
                scale = model.objective_scale,
                "model assembled"
            );

            // SOLVE
            let solution = match self.oracle.solve(&model.lp) {
                Ok(solution) => solution,
                Err(err) => return Ok(outcome.fail(err)),
            };
            info!(
                iteration,
                status = %solution.status,
                solve_ms = solution.solve_time.as_millis() as u64,
                "oracle returned"
            );
            let primal = match (&solution.primal, solution.is_usable()) {
                (Some(primal), true) => primal,
                _ => return Ok(outcome.fail(failure_of(&solution))),
            };
            if solution.status == OracleStatus::Timeout {
                warn!(iteration, "using non-optimal incumbent after solver timeout");
            }

            // EXTRACT
            let extraction = extract(&model, primal, cfg.horizon_slots);
            let next_times = estimate_travel_times(
                network,
                &cfg.congestion,
                &extraction.cell_flows,
                cfg.flow_averaging,
            );
            let congestion = CongestionReport::from_times(network, &next_times);
            let records = assignment_records(network, trips, &options, &extraction, &next_times);
            let link_stats = link_statistics(network, &cfg.congestion, &extraction.cell_flows);
            let overall =
                OverallStatistics::from_links(&link_stats, extraction.average_inconvenience);

            let summary = IterationSummary {
                iteration,
                tstt: extraction.tstt,
                tstt_scaled: extraction.tstt_scaled,
                objective_scale: model.objective_scale,
                total_demand,
                assigned: extraction.assigned,
                unmet: extraction.unmet,
                assignment_rate: if total_demand > 0.0 {
                    100.0 * extraction.assigned / total_demand
                } else {
                    0.0
                },
                average_inconvenience: extraction.average_inconvenience,
                capacity_slack: extraction.capacity_slack,
                options: options.len(),
                rejected: options.rejected.clone(),
                status: solution.status,
                solve_time_ms: solution.solve_time.as_millis(),
                congestion,
            };
            info!(
                iteration,
                tstt = summary.tstt,
                assigned_pct = summary.assignment_rate,
                unmet = summary.unmet,
                inconvenience = summary.average_inconvenience,
                avg_congestion = summary.congestion.average_factor,
                max_congestion = summary.congestion.max_factor,
                congested_links = summary.congestion.congested_links,
                "iteration extracted"
            );

            // CHECK
            let change = previous_tstt.map(|prev| relative_change(prev, extraction.tstt));
            outcome.trace.push(ConvergenceRecord {
                iteration,
                tstt: extraction.tstt,
                relative_change: change,
                optimal: solution.status.is_optimal(),
            });
            outcome.iterations.push(summary);
            outcome.final_iterate = Some(Iterate {
                iteration,
                records,
                link_statistics: link_stats,
                overall,
                cell_flows: extraction.cell_flows,
                effective_times: next_times.clone(),
                options,
            });

            previous_tstt = Some(extraction.tstt);
            previous_expansion = Some(expansion);
            times = next_times;

            if let Some(change) = change {
                info!(iteration, relative_change = change, "convergence check");
                if change < cfg.convergence_threshold {
                    info!(iteration, "assignment converged");
                    return Ok(outcome.finish(TerminalState::Converged));
                }
            }
        }

        info!(
            iterations = cfg.max_iterations,
            "iteration limit reached without convergence"
        );
        Ok(outcome.finish(TerminalState::IterationLimit))
    }
}

fn failure_of(solution: &OracleSolution) -> AssignmentError {
    let detail = solution
        .message
        .clone()
        .unwrap_or_else(|| solution.status.to_string());
    match solution.status {
        OracleStatus::Infeasible => AssignmentError::Infeasible(detail),
        OracleStatus::Unbounded => AssignmentError::Unbounded,
        OracleStatus::Timeout => AssignmentError::SolverTimeout(solution.solve_time),
        OracleStatus::Optimal => {
            AssignmentError::OracleFailure(format!("optimal status without primal values: {detail}"))
        }
        OracleStatus::Unknown => AssignmentError::NumericalIssue(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn relative_change_handles_zero() {
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert!(relative_change(0.0, 1.0).is_infinite());
        assert!((relative_change(100.0, 104.0) - 0.04).abs() < 1e-12);
        assert!((relative_change(100.0, 90.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn failures_keep_their_kind() {
        let d = Duration::from_secs(2);
        let infeasible = OracleSolution::new(OracleStatus::Infeasible, None, d);
        assert!(matches!(failure_of(&infeasible), AssignmentError::Infeasible(_)));
        let timeout = OracleSolution::new(OracleStatus::Timeout, None, d);
        assert!(matches!(
            failure_of(&timeout),
            AssignmentError::SolverTimeout(t) if t == d
        ));
        let unknown = OracleSolution::new(OracleStatus::Unknown, None, d).with_message("stalled");
        assert!(matches!(
            failure_of(&unknown),
            AssignmentError::NumericalIssue(m) if m == "stalled"
        ));
    }

    #[test]
    fn terminal_state_labels() {
        assert_eq!(TerminalState::Converged.to_string(), "CONVERGED");
        assert_eq!(
            serde_json::to_string(&TerminalState::SolveFailed).unwrap(),
            "\"SOLVE_FAILED\""
        );
    }
}
