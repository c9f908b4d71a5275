//! Oracles driven through the `good_lp` modeling layer.

use std::time::Duration;

#[cfg(feature = "solver-clarabel")]
use good_lp::solvers::clarabel::clarabel as clarabel_solver;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as highs_solver;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable,
};
use tracing::debug;
use web_time::Instant;

use super::{OptimizationOracle, OracleSolution, OracleStatus};
use crate::error::AssignmentError;
use crate::lp::{LinearConstraint, LinearProgram, Sense};

/// Solver `good_lp` hands the model to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelerSolver {
    #[cfg(feature = "solver-clarabel")]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

/// Oracle that rebuilds the LP as `good_lp` expressions.
///
/// A time limit is handed to the underlying solver. The modeling layer
/// reports a limit hit as an error, so these backends never return an
/// incumbent with [`OracleStatus::Timeout`].
#[derive(Debug, Clone)]
pub struct GoodLpOracle {
    solver: ModelerSolver,
    time_limit: Option<Duration>,
    verbose: bool,
}

impl GoodLpOracle {
    pub fn new(solver: ModelerSolver) -> Self {
        Self {
            solver,
            time_limit: None,
            verbose: false,
        }
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn add_rows<M>(mut problem: M, rows: &[LinearConstraint], vars: &[Variable]) -> M
where
    M: SolverModel,
{
    for row in rows {
        let mut lhs = Expression::from(0.0);
        for (v, coef) in &row.terms {
            lhs += *coef * vars[v.index()];
        }
        let rhs = row.rhs;
        problem = match row.sense {
            Sense::Eq => problem.with(constraint!(lhs == rhs)),
            Sense::Le => problem.with(constraint!(lhs <= rhs)),
            Sense::Ge => problem.with(constraint!(lhs >= rhs)),
        };
    }
    problem
}

fn status_of(err: &ResolutionError) -> OracleStatus {
    match err {
        ResolutionError::Infeasible => OracleStatus::Infeasible,
        ResolutionError::Unbounded => OracleStatus::Unbounded,
        other => {
            let text = other.to_string().to_ascii_lowercase();
            if text.contains("time") {
                OracleStatus::Timeout
            } else {
                OracleStatus::Unknown
            }
        }
    }
}

impl OptimizationOracle for GoodLpOracle {
    fn id(&self) -> &str {
        match self.solver {
            #[cfg(feature = "solver-clarabel")]
            ModelerSolver::Clarabel => "good_lp/clarabel",
            #[cfg(feature = "solver-highs")]
            ModelerSolver::Highs => "highs",
        }
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn solve(&self, lp: &LinearProgram) -> Result<OracleSolution, AssignmentError> {
        let start = Instant::now();

        let mut vars = variables!();
        let handles: Vec<Variable> = lp
            .variables
            .iter()
            .map(|spec| {
                let def = variable().min(spec.lower);
                match spec.upper {
                    Some(upper) => vars.add(def.max(upper)),
                    None => vars.add(def),
                }
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (v, coef) in &lp.objective {
            objective += *coef * handles[v.index()];
        }
        let unsolved = vars.minimise(objective);

        let outcome: Result<Vec<f64>, ResolutionError> = match self.solver {
            #[cfg(feature = "solver-clarabel")]
            ModelerSolver::Clarabel => {
                let mut problem = unsolved.using(clarabel_solver);
                if let Some(limit) = self.time_limit {
                    problem.settings().time_limit(limit.as_secs_f64());
                }
                problem.settings().verbose(self.verbose);
                let problem = add_rows(problem, &lp.constraints, &handles);
                problem
                    .solve()
                    .map(|s| handles.iter().map(|&h| s.value(h)).collect())
            }
            #[cfg(feature = "solver-highs")]
            ModelerSolver::Highs => {
                let mut problem = unsolved.using(highs_solver);
                if let Some(limit) = self.time_limit {
                    problem.set_option("time_limit", limit.as_secs_f64());
                }
                problem.set_option("output_flag", self.verbose);
                let problem = add_rows(problem, &lp.constraints, &handles);
                problem
                    .solve()
                    .map(|s| handles.iter().map(|&h| s.value(h)).collect())
            }
        };
        let elapsed: Duration = start.elapsed();

        match outcome {
            Ok(values) => {
                debug!(oracle = self.id(), ?elapsed, "good_lp solve finished");
                Ok(OracleSolution::new(OracleStatus::Optimal, Some(values), elapsed))
            }
            Err(err) => {
                let status = status_of(&err);
                debug!(oracle = self.id(), %status, error = %err, "good_lp solve failed");
                Ok(OracleSolution::new(status, None, elapsed).with_message(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "solver-clarabel")]
    fn solves_small_lp_through_modeler() {
        // min 3a + b  s.t. a + b ≥ 2, b ≤ 0.5
        let mut lp = LinearProgram::new();
        let a = lp.add_nonneg();
        let b = lp.add_variable(0.0, Some(0.5));
        lp.add_constraint(vec![(a, 1.0), (b, 1.0)], Sense::Ge, 2.0);
        lp.add_objective_term(a, 3.0);
        lp.add_objective_term(b, 1.0);

        let sol = GoodLpOracle::new(ModelerSolver::Clarabel).solve(&lp).unwrap();
        assert!(sol.is_usable());
        let v = sol.primal.unwrap();
        assert!((v[0] - 1.5).abs() < 1e-5);
        assert!((v[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn resolution_errors_map_to_statuses() {
        assert_eq!(status_of(&ResolutionError::Infeasible), OracleStatus::Infeasible);
        assert_eq!(status_of(&ResolutionError::Unbounded), OracleStatus::Unbounded);
        assert_eq!(
            status_of(&ResolutionError::Str("Time limit reached".into())),
            OracleStatus::Timeout
        );
        assert_eq!(
            status_of(&ResolutionError::Other("numerical trouble")),
            OracleStatus::Unknown
        );
    }
}
