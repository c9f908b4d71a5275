//! Iteration controller state-machine tests with scripted oracles

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use iterflow_algo::lp::LinearProgram;
use iterflow_algo::{
    AssignmentConfig, AssignmentError, ClarabelOracle, IterationController, OptimizationOracle,
    OracleSolution, OracleStatus, TerminalState,
};
use iterflow_core::{Link, LinkKey, Network, Node, NodeId, PathChoice, PathId, Scenario, Trip, TripId};

fn scenario() -> Scenario {
    let mut network = Network::new();
    network.add_node(Node::new(NodeId::new(1), "A"));
    network.add_node(Node::new(NodeId::new(2), "B"));
    network
        .add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 20.0))
        .unwrap();
    let path = PathChoice::new(
        PathId::new(0),
        vec![LinkKey::new(NodeId::new(1), NodeId::new(2))],
    )
    .with_departure_slots([0, 1]);
    Scenario::new(network, vec![Trip::new(TripId::new(1), 30.0).with_path(path)])
}

fn config(max_iterations: usize) -> AssignmentConfig {
    AssignmentConfig::default()
        .with_horizon_slots(4)
        .with_max_iterations(max_iterations)
}

/// Replays a fixed sequence of statuses, solving for real when a status
/// needs primal values.
struct ScriptedOracle {
    script: Mutex<Vec<OracleStatus>>,
    inner: ClarabelOracle,
}

impl ScriptedOracle {
    fn new(mut script: Vec<OracleStatus>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            inner: ClarabelOracle::new(),
        }
    }
}

impl OptimizationOracle for ScriptedOracle {
    fn id(&self) -> &str {
        "scripted"
    }

    fn solve(&self, lp: &LinearProgram) -> Result<OracleSolution, AssignmentError> {
        let status = self
            .script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(OracleStatus::Optimal);
        match status {
            OracleStatus::Optimal => self.inner.solve(lp),
            OracleStatus::Timeout => {
                let solved = self.inner.solve(lp)?;
                Ok(OracleSolution::new(OracleStatus::Timeout, solved.primal, solved.solve_time))
            }
            other => Ok(OracleSolution::new(other, None, Default::default())),
        }
    }
}

/// Scales every primal value by a per-call factor so TSTT moves between
/// iterations.
struct DriftingOracle {
    factors: Vec<f64>,
    calls: AtomicUsize,
    inner: ClarabelOracle,
}

impl OptimizationOracle for DriftingOracle {
    fn id(&self) -> &str {
        "drifting"
    }

    fn solve(&self, lp: &LinearProgram) -> Result<OracleSolution, AssignmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let factor = self.factors.get(call).copied().unwrap_or(1.0);
        let mut solved = self.inner.solve(lp)?;
        if let Some(primal) = solved.primal.as_mut() {
            primal.iter_mut().for_each(|v| *v *= factor);
        }
        Ok(solved)
    }
}

fn run(oracle: impl OptimizationOracle + 'static, max_iterations: usize) -> iterflow_algo::AssignmentOutcome {
    IterationController::new(config(max_iterations), Arc::new(oracle))
        .run(&scenario())
        .unwrap()
}

#[test]
fn infeasible_first_solve_has_no_iterate() {
    let outcome = run(ScriptedOracle::new(vec![OracleStatus::Infeasible]), 3);
    assert_eq!(outcome.terminal, TerminalState::SolveFailed);
    assert!(outcome.iterations.is_empty());
    assert!(outcome.final_iterate.is_none());
    assert!(matches!(outcome.failure, Some(AssignmentError::Infeasible(_))));
}

#[test]
fn failure_keeps_last_usable_iterate() {
    let outcome = run(
        ScriptedOracle::new(vec![OracleStatus::Optimal, OracleStatus::Unbounded]),
        3,
    );
    assert_eq!(outcome.terminal, TerminalState::SolveFailed);
    assert!(!outcome.is_success());
    assert_eq!(outcome.iterations.len(), 1);
    assert_eq!(outcome.final_iterate.as_ref().unwrap().iteration, 1);
    assert!(matches!(outcome.failure, Some(AssignmentError::Unbounded)));
}

#[test]
fn timeout_with_incumbent_is_accepted_as_non_optimal() {
    let outcome = run(
        ScriptedOracle::new(vec![OracleStatus::Timeout, OracleStatus::Optimal]),
        3,
    );
    assert_eq!(outcome.terminal, TerminalState::Converged);
    assert!(!outcome.trace[0].optimal);
    assert!(outcome.trace[1].optimal);
    assert_eq!(outcome.iterations[0].status, OracleStatus::Timeout);
}

#[test]
fn unknown_status_fails_the_run() {
    let outcome = run(ScriptedOracle::new(vec![OracleStatus::Unknown]), 2);
    assert_eq!(outcome.terminal, TerminalState::SolveFailed);
    assert!(matches!(outcome.failure, Some(AssignmentError::NumericalIssue(_))));
}

#[test]
fn drifting_tstt_exhausts_iterations() {
    let oracle = DriftingOracle {
        factors: vec![1.0, 1.5, 1.0],
        calls: AtomicUsize::new(0),
        inner: ClarabelOracle::new(),
    };
    let outcome = run(oracle, 3);
    assert_eq!(outcome.terminal, TerminalState::IterationLimit);
    assert_eq!(outcome.trace.len(), 3);
    let change = outcome.trace[1].relative_change.unwrap();
    assert!((change - 0.5).abs() < 1e-6, "change {change}");
    assert!(outcome.trace[2].relative_change.unwrap() > 0.05);
}

#[test]
fn trips_without_options_fail_the_build() {
    let mut scenario = scenario();
    scenario.trips[0].paths[0].links = vec![LinkKey::new(NodeId::new(2), NodeId::new(1))];
    let outcome = IterationController::new(config(3), Arc::new(ClarabelOracle::new()))
        .run(&scenario)
        .unwrap();
    assert_eq!(outcome.terminal, TerminalState::SolveFailed);
    assert!(matches!(outcome.failure, Some(AssignmentError::NoOptions(_))));
}

#[test]
fn invalid_config_is_an_error() {
    let mut cfg = config(3);
    cfg.slot_minutes = 0.0;
    let err = IterationController::new(cfg, Arc::new(ClarabelOracle::new()))
        .run(&scenario())
        .err()
        .unwrap();
    assert!(matches!(err, AssignmentError::Config(_)));
}
