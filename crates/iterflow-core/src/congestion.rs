//! BPR-type congestion law and its Beckmann potential.
//!
//! ```text
//! latency(x)   = ff · (1 + α · (x/μ)^β)
//! potential(x) = ∫₀ˣ latency(s) ds = ff · (x + α · x^(β+1) / ((β+1) · μ^β))
//! ```
//!
//! With the standard α = 0.15, β = 4 the latency is quartic in flow. Both
//! functions are convex and non-decreasing in `x ≥ 0`, which is what makes a
//! piecewise-linear relaxation of the potential exact at its breakpoints.

use serde::{Deserialize, Serialize};

/// Volume-delay law `ff · (1 + alpha · (x/mu)^beta)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BprLaw {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BprLaw {
    fn default() -> Self {
        Self {
            alpha: 0.15,
            beta: 4.0,
        }
    }
}

impl BprLaw {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Congested traversal time at flow `x`. Links without capacity are
    /// treated as uncongested.
    #[inline]
    pub fn latency(&self, free_flow: f64, capacity: f64, flow: f64) -> f64 {
        if capacity <= 0.0 {
            return free_flow;
        }
        free_flow * (1.0 + self.alpha * (flow / capacity).powf(self.beta))
    }

    /// Beckmann integral of [`latency`](Self::latency) from 0 to `x`.
    #[inline]
    pub fn potential(&self, free_flow: f64, capacity: f64, flow: f64) -> f64 {
        if capacity <= 0.0 {
            return free_flow * flow;
        }
        let exponent = self.beta + 1.0;
        free_flow
            * (flow + self.alpha * flow.powf(exponent) / (exponent * capacity.powf(self.beta)))
    }

    /// Travel-time index (`latency / ff`) at a given volume/capacity ratio.
    pub fn travel_time_index(&self, utilization: f64) -> f64 {
        1.0 + self.alpha * utilization.max(0.0).powf(self.beta)
    }

    /// Volume/capacity ratio at which the travel-time index reaches `tti_cap`,
    /// widened by `headroom`.
    ///
    /// This is the utilization ceiling `u_max` of the assignment model: cell
    /// flows are linearized on `[0, u_max · μ]`.
    pub fn utilization_ceiling(&self, tti_cap: f64, headroom: f64) -> f64 {
        let raw = ((tti_cap - 1.0).max(0.0) / self.alpha).powf(1.0 / self.beta);
        raw * headroom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn latency_at_zero_flow_is_free_flow() {
        let law = BprLaw::default();
        assert!((law.latency(5.0, 20.0, 0.0) - 5.0).abs() < TOL);
    }

    #[test]
    fn latency_at_capacity_adds_fifteen_percent() {
        let law = BprLaw::default();
        assert!((law.latency(10.0, 20.0, 20.0) - 11.5).abs() < TOL);
    }

    #[test]
    fn uncapacitated_link_never_congests() {
        let law = BprLaw::default();
        assert_eq!(law.latency(3.0, 0.0, 1e6), 3.0);
        assert_eq!(law.potential(3.0, 0.0, 10.0), 30.0);
    }

    #[test]
    fn potential_derivative_matches_latency() {
        let law = BprLaw::default();
        let (ff, mu, x, h) = (7.0, 12.0, 9.0, 1e-5);
        let numeric = (law.potential(ff, mu, x + h) - law.potential(ff, mu, x - h)) / (2.0 * h);
        assert!((numeric - law.latency(ff, mu, x)).abs() < 1e-5);
    }

    #[test]
    fn utilization_ceiling_reproduces_tti_cap() {
        let law = BprLaw::default();
        let u = law.utilization_ceiling(4.0, 1.0);
        assert!((law.travel_time_index(u) - 4.0).abs() < 1e-9);

        let widened = law.utilization_ceiling(4.0, 1.10);
        assert!((widened - 1.10 * u).abs() < 1e-12);
    }
}
