//! Solver-neutral linear program.
//!
//! The assembler emits a [`LinearProgram`]; oracle adapters translate it into
//! whatever their backend expects. Keeping the model in plain vectors makes
//! two builds directly comparable, which is how assembly determinism is
//! tested.

use serde::Serialize;

/// Index of a variable inside a [`LinearProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Continuous variable bounded below (and optionally above).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VariableSpec {
    pub lower: f64,
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Eq,
    Le,
    Ge,
}

/// `Σ coef·var  (= | <= | >=)  rhs`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Left-hand side evaluated at `x`.
    pub fn activity(&self, x: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * x[v.index()]).sum()
    }

    /// Violation at `x` (zero when satisfied).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs = self.activity(x);
        match self.sense {
            Sense::Eq => (lhs - self.rhs).abs(),
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
        }
    }
}

/// Minimization LP over continuous variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinearProgram {
    pub variables: Vec<VariableSpec>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: Vec<(VarId, f64)>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, lower: f64, upper: Option<f64>) -> VarId {
        self.variables.push(VariableSpec { lower, upper });
        VarId(self.variables.len() - 1)
    }

    /// Variable bounded to `[0, ∞)`.
    pub fn add_nonneg(&mut self) -> VarId {
        self.add_variable(0.0, None)
    }

    pub fn add_constraint(&mut self, terms: Vec<(VarId, f64)>, sense: Sense, rhs: f64) {
        self.constraints.push(LinearConstraint { terms, sense, rhs });
    }

    pub fn add_objective_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.objective.push((var, coef));
        }
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn num_nonzeros(&self) -> usize {
        self.constraints.iter().map(|c| c.terms.len()).sum()
    }

    pub fn objective_value(&self, x: &[f64]) -> f64 {
        self.objective.iter().map(|(v, c)| c * x[v.index()]).sum()
    }

    /// Largest constraint or bound violation at `x`.
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let rows = self
            .constraints
            .iter()
            .map(|c| c.violation(x))
            .fold(0.0, f64::max);
        let bounds = self
            .variables
            .iter()
            .zip(x)
            .map(|(spec, &v)| {
                let below = (spec.lower - v).max(0.0);
                let above = spec.upper.map_or(0.0, |u| (v - u).max(0.0));
                below.max(above)
            })
            .fold(0.0, f64::max);
        rows.max(bounds)
    }
}
