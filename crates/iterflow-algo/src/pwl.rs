//! Piecewise-linear approximation of the per-cell congestion law.
//!
//! A link occupying `dur` slots spreads its traversal time and its Beckmann
//! potential evenly over those cells, so the per-cell curves are the link
//! curves divided by `dur`. Each curve is cut into `H` equal flow segments on
//! `[0, u_max·mu]`:
//!
//! ```text
//! η(x) ≈ Σ_h κ_h · λ_h          κ_h   = Δσ / Δx / dur · scale
//! u(x) ≈ u0 + Σ_h κ^u_h · λ_h   κ^u_h = Δ(lat/dur) / Δx,  u0 = ff / dur
//! x    = Σ_h λ_h,  0 ≤ λ_h ≤ Δx
//! ```
//!
//! Both slope sequences are non-negative and non-decreasing because the BPR
//! law is convex, so a minimizer fills cheap segments first and the
//! relaxation is exact at the breakpoints.

use iterflow_core::{BprLaw, Link};
use serde::Serialize;

/// Smallest flow span a link is linearized over.
pub const MIN_SPAN: f64 = 1e-6;
/// Floor for potential slopes; keeps every segment strictly costly.
pub const MIN_POTENTIAL_SLOPE: f64 = 1e-9;

/// Linearization of one link's per-cell potential and latency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PwlCurve {
    /// `H + 1` flow breakpoints starting at 0
    pub breakpoints: Vec<f64>,
    /// `H` segment lengths
    pub segment_lengths: Vec<f64>,
    /// Scaled potential slopes `κ_h`
    pub potential_slopes: Vec<f64>,
    /// Latency slopes `κ^u_h` (unscaled, minutes per vehicle)
    pub latency_slopes: Vec<f64>,
    /// Per-cell latency at zero flow
    pub base_latency: f64,
    /// Slots the link occupies
    pub duration: usize,
}

impl PwlCurve {
    pub fn segments(&self) -> usize {
        self.segment_lengths.len()
    }

    /// Upper end of the linearized flow range.
    pub fn span(&self) -> f64 {
        self.breakpoints.last().copied().unwrap_or(0.0)
    }

    /// Linearized per-cell latency at flow `x` with segments filled in order.
    pub fn latency_at(&self, x: f64) -> f64 {
        let mut remaining = x.max(0.0);
        let mut u = self.base_latency;
        for (len, slope) in self.segment_lengths.iter().zip(&self.latency_slopes) {
            let take = remaining.min(*len);
            u += slope * take;
            remaining -= take;
            if remaining <= 0.0 {
                break;
            }
        }
        u
    }
}

/// Build the curve of `link` for the given slot duration.
///
/// `objective_scale` multiplies potential slopes only; latency slopes stay in
/// minutes so that modeled travel times remain physical.
pub fn approximate(
    law: &BprLaw,
    link: &Link,
    utilization_ceiling: f64,
    segments: usize,
    duration: usize,
    objective_scale: f64,
) -> PwlCurve {
    let ff = link.free_flow_minutes;
    let mu = link.capacity_per_slot;
    let dur = duration.max(1) as f64;
    let segments = segments.max(1);

    let span = (utilization_ceiling * mu).max(MIN_SPAN);
    let breakpoints: Vec<f64> = (0..=segments)
        .map(|h| span * h as f64 / segments as f64)
        .collect();

    let mut segment_lengths = Vec::with_capacity(segments);
    let mut potential_slopes = Vec::with_capacity(segments);
    let mut latency_slopes = Vec::with_capacity(segments);

    for pair in breakpoints.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        segment_lengths.push(b - a);
        let ds = (b - a).max(MIN_SPAN);

        let raw = (law.potential(ff, mu, b) - law.potential(ff, mu, a)) / ds / dur;
        potential_slopes.push((raw * objective_scale).max(MIN_POTENTIAL_SLOPE));

        let du = law.latency(ff, mu, b) / dur - law.latency(ff, mu, a) / dur;
        latency_slopes.push((du / ds).max(0.0));
    }

    PwlCurve {
        breakpoints,
        segment_lengths,
        potential_slopes,
        latency_slopes,
        base_latency: ff / dur,
        duration: duration.max(1),
    }
}
