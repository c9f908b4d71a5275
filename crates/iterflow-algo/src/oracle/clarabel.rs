//! Clarabel backend using the solver's native conic interface.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! An LP maps onto this with `P = 0`, equality rows in the zero cone and
//! inequality rows (including variable bounds) in the non-negative cone.

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT},
};
use std::time::Duration;
use tracing::debug;
use web_time::Instant;

use super::{OptimizationOracle, OracleSolution, OracleStatus};
use crate::error::AssignmentError;
use crate::lp::{LinearProgram, Sense};

/// Clarabel interior-point oracle.
///
/// Clarabel is a pure-Rust interior-point solver that's always available.
#[derive(Debug, Clone, Default)]
pub struct ClarabelOracle {
    time_limit: Option<Duration>,
    verbose: bool,
}

impl ClarabelOracle {
    pub fn new() -> Self {
        Self::default()
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

/// `A`, `b` and cone list in Clarabel's standard form.
struct ConicForm {
    a: CscMatrix<f64>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

fn conic_form(lp: &LinearProgram) -> ConicForm {
    let n_var = lp.num_variables();
    let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
    let mut b = Vec::new();

    // Zero cone first, then the non-negative cone
    let mut n_eq = 0;
    for c in lp.constraints.iter().filter(|c| c.sense == Sense::Eq) {
        let row = b.len();
        for (v, coef) in &c.terms {
            columns[v.index()].push((row, *coef));
        }
        b.push(c.rhs);
        n_eq += 1;
    }

    let ineq_start = b.len();
    for c in lp.constraints.iter().filter(|c| c.sense != Sense::Eq) {
        let row = b.len();
        let sign = if c.sense == Sense::Ge { -1.0 } else { 1.0 };
        for (v, coef) in &c.terms {
            columns[v.index()].push((row, sign * coef));
        }
        b.push(sign * c.rhs);
    }
    for (j, spec) in lp.variables.iter().enumerate() {
        if spec.lower.is_finite() {
            columns[j].push((b.len(), -1.0));
            b.push(-spec.lower);
        }
        if let Some(upper) = spec.upper {
            columns[j].push((b.len(), 1.0));
            b.push(upper);
        }
    }
    let n_ineq = b.len() - ineq_start;

    // CSC: each column sorted by row, duplicate rows merged
    let mut col_ptr = Vec::with_capacity(n_var + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    for column in columns.iter_mut() {
        col_ptr.push(row_idx.len());
        column.sort_by_key(|(r, _)| *r);
        for &(r, v) in column.iter() {
            if row_idx.len() > *col_ptr.last().unwrap_or(&0) && row_idx.last() == Some(&r) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
                continue;
            }
            row_idx.push(r);
            values.push(v);
        }
    }
    col_ptr.push(row_idx.len());

    let mut cones = Vec::new();
    if n_eq > 0 {
        cones.push(SupportedConeT::ZeroConeT(n_eq));
    }
    if n_ineq > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(n_ineq));
    }

    ConicForm {
        a: CscMatrix::new(b.len(), n_var, col_ptr, row_idx, values),
        b,
        cones,
    }
}

impl OptimizationOracle for ClarabelOracle {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn solve(&self, lp: &LinearProgram) -> Result<OracleSolution, AssignmentError> {
        let start = Instant::now();
        let n_var = lp.num_variables();

        let mut q = vec![0.0; n_var];
        for (v, coef) in &lp.objective {
            q[v.index()] += coef;
        }
        let p = CscMatrix::new(n_var, n_var, vec![0; n_var + 1], Vec::new(), Vec::new());
        let form = conic_form(lp);

        let time_limit = self.time_limit.map_or(f64::INFINITY, |d| d.as_secs_f64());
        let settings = DefaultSettingsBuilder::default()
            .verbose(self.verbose)
            .time_limit(time_limit)
            .build()
            .map_err(|e| AssignmentError::OracleFailure(format!("Clarabel settings error: {:?}", e)))?;

        let mut solver = DefaultSolver::new(&p, &q, &form.a, &form.b, &form.cones, settings)
            .map_err(|e| {
                AssignmentError::OracleFailure(format!("Clarabel initialization failed: {:?}", e))
            })?;
        solver.solve();

        let sol = &solver.solution;
        let finite_x = || {
            if sol.x.len() == n_var && sol.x.iter().all(|v| v.is_finite()) {
                Some(sol.x.clone())
            } else {
                None
            }
        };
        let (status, primal) = match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                (OracleStatus::Optimal, finite_x())
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                (OracleStatus::Infeasible, None)
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                (OracleStatus::Unbounded, None)
            }
            SolverStatus::MaxTime => (OracleStatus::Timeout, finite_x()),
            _ => (OracleStatus::Unknown, None),
        };

        debug!(
            status = ?sol.status,
            iterations = sol.iterations,
            objective = sol.obj_val,
            "clarabel finished"
        );

        Ok(OracleSolution::new(status, primal, start.elapsed())
            .with_message(format!("{:?}", sol.status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clarabel_oracle_id() {
        assert_eq!(ClarabelOracle::new().id(), "clarabel");
    }

    #[test]
    fn solves_small_lp() {
        // min x + 2y  s.t. x + y = 4, x ≤ 3, y ≥ 0
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(0.0, Some(3.0));
        let y = lp.add_nonneg();
        lp.add_constraint(vec![(x, 1.0), (y, 1.0)], Sense::Eq, 4.0);
        lp.add_objective_term(x, 1.0);
        lp.add_objective_term(y, 2.0);

        let sol = ClarabelOracle::new().solve(&lp).unwrap();
        assert_eq!(sol.status, OracleStatus::Optimal);
        let v = sol.primal.unwrap();
        assert!((v[0] - 3.0).abs() < 1e-5);
        assert!((v[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ge_rows_are_respected() {
        // min x  s.t. x ≥ 2.5
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg();
        lp.add_constraint(vec![(x, 1.0)], Sense::Ge, 2.5);
        lp.add_objective_term(x, 1.0);
        let sol = ClarabelOracle::new().solve(&lp).unwrap();
        assert!((sol.primal.unwrap()[0] - 2.5).abs() < 1e-5);
    }

    #[test]
    fn detects_infeasibility() {
        // x ≤ 1 and x ≥ 2
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg();
        lp.add_constraint(vec![(x, 1.0)], Sense::Le, 1.0);
        lp.add_constraint(vec![(x, 1.0)], Sense::Ge, 2.0);
        lp.add_objective_term(x, 1.0);
        let sol = ClarabelOracle::new().solve(&lp).unwrap();
        assert_eq!(sol.status, OracleStatus::Infeasible);
        assert!(!sol.is_usable());
    }

    #[test]
    fn duplicate_terms_are_merged() {
        // min x  s.t. x + x = 4
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg();
        lp.add_constraint(vec![(x, 1.0), (x, 1.0)], Sense::Eq, 4.0);
        lp.add_objective_term(x, 1.0);
        let sol = ClarabelOracle::new().solve(&lp).unwrap();
        assert!((sol.primal.unwrap()[0] - 2.0).abs() < 1e-5);
    }
}
