//! Equilibrium model assembly.
//!
//! Builds one iteration's linear program over the options produced by
//! [`crate::options::generate_options`].
//!
//! ## Variables
//!
//! | Symbol | Per | Bounds |
//! |--------|-----|--------|
//! | `y` | option | `≥ 0` |
//! | `r` | trip | `≥ 0` (unmet demand) |
//! | `x` | cell | `≥ 0` |
//! | `λ_h` | cell × segment | `[0, Δx_h]` |
//! | `η` | cell | `≥ 0` (scaled potential) |
//! | `u` | cell | `≥ 0` (latency, minutes) |
//! | `s` | cell | `≥ 0` (capacity slack, only when relaxed) |
//! | `TT` | option | `≥ 0` |
//! | `I` | option | `≥ floor` |
//!
//! ## Constraints
//!
//! ```text
//! Σ_options(trip) y + r = D                       demand
//! x − Σ_{o ∋ cell} y = Z                          flow definition
//! x − Σ_h λ_h = 0                                 segment sum
//! Σ_{s ≤ h} λ_s ≤ b_h                             prefix (optional)
//! η − Σ_h κ_h λ_h = 0                             potential
//! u − Σ_h κ^u_h λ_h = u0                          latency
//! x − s ≤ u_max · mu                              capacity
//! TT − Σ_{cells(o)} u = 0                         travel time
//! ff · I − TT = 0      (I = 1 when ff ≈ 0)        inconvenience
//! ```
//!
//! Objective: `min Σ η + P_D · scale · Σ r + P_C · scale · Σ s`.

use std::collections::{BTreeMap, HashMap};

use iterflow_core::{BackgroundTraffic, LinkKey, Network, Trip};
use tracing::{debug, info};

use crate::config::AssignmentConfig;
use crate::error::AssignmentError;
use crate::expansion::TimeExpansion;
use crate::lp::{LinearProgram, Sense, VarId};
use crate::options::{Cell, OptionSet};
use crate::pwl::{self, PwlCurve};
use crate::scaling;

/// Free-flow times below this are treated as zero when defining `I`.
const MIN_FREE_FLOW: f64 = 1e-9;

/// Variables of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellVars {
    pub cell: Cell,
    pub flow: VarId,
    pub potential: VarId,
    pub latency: VarId,
    pub segments: Vec<VarId>,
    pub slack: Option<VarId>,
    /// Background flow `Z` entering the flow definition
    pub background: f64,
}

/// Where each modeled quantity lives in the LP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelLayout {
    /// `y` per option, aligned with [`OptionSet::options`]
    pub option_flows: Vec<VarId>,
    /// `TT` per option
    pub travel_times: Vec<VarId>,
    /// `I` per option
    pub inconvenience: Vec<VarId>,
    /// `r` per trip, aligned with the scenario's trips
    pub shortfalls: Vec<VarId>,
    /// Cells in link order, then slot order
    pub cells: Vec<CellVars>,
    cell_index: HashMap<Cell, usize>,
}

impl ModelLayout {
    pub fn cell(&self, cell: &Cell) -> Option<&CellVars> {
        self.cell_index.get(cell).map(|&i| &self.cells[i])
    }
}

/// A fully instantiated iteration model.
#[derive(Debug, Clone)]
pub struct EquilibriumModel {
    pub lp: LinearProgram,
    pub layout: ModelLayout,
    pub objective_scale: f64,
    /// Scaled demand penalty per vehicle
    pub demand_penalty: f64,
    /// Scaled capacity-slack penalty per vehicle, zero when capacity is hard
    pub capacity_penalty: f64,
    pub curves: BTreeMap<LinkKey, PwlCurve>,
}

/// Static data of one build.
#[derive(Debug, Clone, Copy)]
pub struct ModelInputs<'a> {
    pub network: &'a Network,
    pub trips: &'a [Trip],
    /// Background traffic already scaled and clipped
    pub background: &'a BackgroundTraffic,
    pub options: &'a OptionSet,
    pub expansion: &'a TimeExpansion,
}

/// Builds [`EquilibriumModel`]s from a configuration.
#[derive(Debug, Clone)]
pub struct EquilibriumAssembler {
    config: AssignmentConfig,
}

impl EquilibriumAssembler {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    pub fn build(&self, inputs: ModelInputs<'_>) -> Result<EquilibriumModel, AssignmentError> {
        let cfg = &self.config;
        cfg.validate()?;

        if inputs.options.is_empty() {
            return Err(AssignmentError::NoOptions(format!(
                "{} trips, none with a feasible (path, departure) option",
                inputs.trips.len()
            )));
        }

        let law = cfg.congestion;
        let u_max = cfg.utilization_ceiling();
        let total_demand: f64 = inputs.trips.iter().map(|t| t.demand).sum();
        let scale = scaling::objective_scale(
            &law,
            inputs.network,
            total_demand,
            cfg.horizon_slots,
            cfg.objective_target,
        );
        let demand_penalty = cfg.demand_penalty * scale;
        let capacity_penalty = if cfg.relax_capacity {
            cfg.capacity_penalty * scale
        } else {
            0.0
        };

        let mut lp = LinearProgram::new();
        let mut layout = ModelLayout::default();
        let mut curves = BTreeMap::new();

        // Option and trip variables
        for _ in &inputs.options.options {
            layout.option_flows.push(lp.add_nonneg());
        }
        for _ in inputs.trips {
            let r = lp.add_nonneg();
            lp.add_objective_term(r, demand_penalty);
            layout.shortfalls.push(r);
        }

        // Cell variables with their PWL rows
        for link in inputs.network.links() {
            let key = link.key();
            let duration = inputs.expansion.duration(&key).ok_or_else(|| {
                AssignmentError::DataValidation(format!("no slot duration for link {key}"))
            })?;
            let curve = pwl::approximate(&law, link, u_max, cfg.pwl_segments, duration, scale);
            let ceiling = u_max * link.capacity_per_slot;

            for slot in 0..cfg.horizon_slots {
                let cell = Cell::new(key, slot);
                let flow = lp.add_nonneg();
                let potential = lp.add_nonneg();
                let latency = lp.add_nonneg();
                let segments: Vec<VarId> = curve
                    .segment_lengths
                    .iter()
                    .map(|&len| lp.add_variable(0.0, Some(len)))
                    .collect();

                // x = Σ λ
                let mut row = vec![(flow, 1.0)];
                row.extend(segments.iter().map(|&l| (l, -1.0)));
                lp.add_constraint(row, Sense::Eq, 0.0);

                if cfg.pwl_prefix {
                    for h in 1..=segments.len() {
                        let row = segments[..h].iter().map(|&l| (l, 1.0)).collect();
                        lp.add_constraint(row, Sense::Le, curve.breakpoints[h]);
                    }
                }

                // η = Σ κ λ
                let mut row = vec![(potential, 1.0)];
                row.extend(
                    segments
                        .iter()
                        .zip(&curve.potential_slopes)
                        .map(|(&l, &k)| (l, -k)),
                );
                lp.add_constraint(row, Sense::Eq, 0.0);
                lp.add_objective_term(potential, 1.0);

                // u = u0 + Σ κu λ
                let mut row = vec![(latency, 1.0)];
                row.extend(
                    segments
                        .iter()
                        .zip(&curve.latency_slopes)
                        .map(|(&l, &k)| (l, -k)),
                );
                lp.add_constraint(row, Sense::Eq, curve.base_latency);

                // x ≤ u_max·mu (+ s)
                let slack = if cfg.relax_capacity {
                    let s = lp.add_nonneg();
                    lp.add_objective_term(s, capacity_penalty);
                    lp.add_constraint(vec![(flow, 1.0), (s, -1.0)], Sense::Le, ceiling);
                    Some(s)
                } else {
                    lp.add_constraint(vec![(flow, 1.0)], Sense::Le, ceiling);
                    None
                };

                layout.cell_index.insert(cell, layout.cells.len());
                layout.cells.push(CellVars {
                    cell,
                    flow,
                    potential,
                    latency,
                    segments,
                    slack,
                    background: inputs.background.get(&key, slot),
                });
            }
            curves.insert(key, curve);
        }

        // Demand: Σ y + r = D
        let mut per_trip: Vec<Vec<(VarId, f64)>> = vec![Vec::new(); inputs.trips.len()];
        for (option, &y) in inputs.options.options.iter().zip(&layout.option_flows) {
            per_trip[option.trip_index].push((y, 1.0));
        }
        for ((trip, mut row), &r) in inputs.trips.iter().zip(per_trip).zip(&layout.shortfalls) {
            row.push((r, 1.0));
            lp.add_constraint(row, Sense::Eq, trip.demand);
        }

        // Flow definition: x − Σ y = Z
        for cv in &layout.cells {
            let mut row = vec![(cv.flow, 1.0)];
            if let Some(users) = inputs.options.incidence.get(&cv.cell) {
                row.extend(users.iter().map(|&o| (layout.option_flows[o], -1.0)));
            }
            lp.add_constraint(row, Sense::Eq, cv.background);
        }

        // Travel time and inconvenience per option
        for option in &inputs.options.options {
            let tt = lp.add_nonneg();
            let inc = lp.add_variable(cfg.inconvenience_floor, None);

            let mut row = vec![(tt, 1.0)];
            for cell in &option.cells {
                let cv = layout.cell(cell).ok_or_else(|| {
                    AssignmentError::DataValidation(format!(
                        "option {} occupies cell {}@{} outside the model",
                        option.key, cell.link, cell.slot
                    ))
                })?;
                row.push((cv.latency, -1.0));
            }
            lp.add_constraint(row, Sense::Eq, 0.0);

            if option.free_flow_minutes > MIN_FREE_FLOW {
                lp.add_constraint(
                    vec![(inc, option.free_flow_minutes), (tt, -1.0)],
                    Sense::Eq,
                    0.0,
                );
            } else {
                lp.add_constraint(vec![(inc, 1.0)], Sense::Eq, 1.0);
            }

            layout.travel_times.push(tt);
            layout.inconvenience.push(inc);
        }

        info!(
            options = inputs.options.len(),
            cells = layout.cells.len(),
            variables = lp.num_variables(),
            constraints = lp.num_constraints(),
            nonzeros = lp.num_nonzeros(),
            objective_scale = scale,
            "assembled equilibrium model"
        );
        debug!(demand_penalty, capacity_penalty, u_max, "penalties");

        Ok(EquilibriumModel {
            lp,
            layout,
            objective_scale: scale,
            demand_penalty,
            capacity_penalty,
            curves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::free_flow_times;
    use crate::options::{generate_options, OptionRules};
    use iterflow_core::{Link, Node, NodeId, PathChoice, PathId, TripId};

    fn key() -> LinkKey {
        LinkKey::new(NodeId::new(1), NodeId::new(2))
    }

    fn fixture() -> (Network, Vec<Trip>) {
        let mut n = Network::new();
        n.add_node(Node::new(NodeId::new(1), "A"));
        n.add_node(Node::new(NodeId::new(2), "B"));
        n.add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 20.0)).unwrap();
        let trips = vec![Trip::new(TripId::new(1), 10.0)
            .with_path(PathChoice::new(PathId::new(0), vec![key()]).with_departure_slots([0, 1]))];
        (n, trips)
    }

    fn config() -> AssignmentConfig {
        AssignmentConfig::default().with_horizon_slots(4)
    }

    fn build(cfg: AssignmentConfig) -> EquilibriumModel {
        let (net, trips) = fixture();
        let times = free_flow_times(&net);
        let exp = TimeExpansion::new(&net, &times, cfg.slot_minutes);
        let options = generate_options(&net, &trips, &times, &exp, OptionRules::from(&cfg));
        let mut background = BackgroundTraffic::new();
        background.set(key(), 2, 3.0);
        EquilibriumAssembler::new(cfg)
            .build(ModelInputs {
                network: &net,
                trips: &trips,
                background: &background,
                options: &options,
                expansion: &exp,
            })
            .unwrap()
    }

    #[test]
    fn dimensions_match_formulation() {
        let model = build(config());
        let h = 10;
        let cells = 4;
        let options = 2;
        // per cell: x, η, u, s, H λ; per option: y, TT, I; per trip: r
        assert_eq!(
            model.lp.num_variables(),
            cells * (4 + h) + options * 3 + 1
        );
        // per cell: segment sum, η, u, capacity, flow def; per option: TT, I; per trip: demand
        assert_eq!(model.lp.num_constraints(), cells * 5 + options * 2 + 1);
        assert_eq!(model.layout.cells.len(), 4);
        assert_eq!(model.layout.cell(&Cell::new(key(), 2)).unwrap().background, 3.0);
    }

    #[test]
    fn hard_capacity_and_prefix_change_rows() {
        let mut cfg = config();
        cfg.relax_capacity = false;
        cfg.pwl_prefix = true;
        let model = build(cfg);
        assert_eq!(model.capacity_penalty, 0.0);
        assert!(model.layout.cells.iter().all(|c| c.slack.is_none()));
        assert_eq!(model.lp.num_constraints(), 4 * (5 + 10) + 2 * 2 + 1);
    }

    #[test]
    fn rebuild_is_identical() {
        let a = build(config());
        let b = build(config());
        assert_eq!(a.lp, b.lp);
        assert_eq!(a.layout, b.layout);
        assert_eq!(a.objective_scale, b.objective_scale);
    }

    #[test]
    fn empty_option_set_is_rejected() {
        let (net, trips) = fixture();
        let cfg = config();
        let exp = TimeExpansion::new(&net, &free_flow_times(&net), cfg.slot_minutes);
        let err = EquilibriumAssembler::new(cfg)
            .build(ModelInputs {
                network: &net,
                trips: &trips,
                background: &BackgroundTraffic::new(),
                options: &OptionSet::default(),
                expansion: &exp,
            })
            .unwrap_err();
        assert!(matches!(err, AssignmentError::NoOptions(_)));
    }
}
