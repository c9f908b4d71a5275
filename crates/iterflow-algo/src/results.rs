//! Result extraction from a solved iteration.

use std::collections::BTreeMap;

use iterflow_core::{BprLaw, LinkKey, Network, PathId, Trip, TripId};
use serde::{Deserialize, Serialize};

use crate::assembler::EquilibriumModel;
use crate::estimator::CongestionReport;
use crate::expansion::TravelTimes;
use crate::options::{OptionSet, RejectionCounts};
use crate::oracle::OracleStatus;

/// Options carrying less than this are left out of assignment records.
pub const RECORD_MIN_VEHICLES: f64 = 1e-4;
/// Options carrying less than this are left out of the mean inconvenience.
pub const INCONVENIENCE_MIN_VEHICLES: f64 = 1e-6;

/// Solved flow `x` per link and slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellFlows {
    horizon_slots: usize,
    flows: BTreeMap<LinkKey, Vec<f64>>,
}

impl CellFlows {
    pub fn new(horizon_slots: usize) -> Self {
        Self {
            horizon_slots,
            flows: BTreeMap::new(),
        }
    }

    pub fn horizon_slots(&self) -> usize {
        self.horizon_slots
    }

    /// Set one cell; slots past the horizon are ignored.
    pub fn set(&mut self, link: LinkKey, slot: usize, value: f64) {
        if slot >= self.horizon_slots {
            return;
        }
        let horizon = self.horizon_slots;
        self.flows
            .entry(link)
            .or_insert_with(|| vec![0.0; horizon])[slot] = value;
    }

    pub fn add(&mut self, link: LinkKey, slot: usize, value: f64) {
        let current = self.get(&link, slot);
        self.set(link, slot, current + value);
    }

    pub fn get(&self, link: &LinkKey, slot: usize) -> f64 {
        self.flows
            .get(link)
            .and_then(|s| s.get(slot))
            .copied()
            .unwrap_or(0.0)
    }

    /// Full-horizon series of `link`.
    pub fn series(&self, link: &LinkKey) -> Option<&[f64]> {
        self.flows.get(link).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkKey, &[f64])> + '_ {
        self.flows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn total(&self) -> f64 {
        self.flows.values().flatten().sum()
    }
}

/// Vehicles assigned to one option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub trip: TripId,
    pub path: PathId,
    pub departure_slot: usize,
    pub vehicles_assigned: f64,
    pub demand: f64,
    pub free_flow_time: f64,
    /// Path time under the effective link times estimated from this solve
    pub effective_time: f64,
    /// Linearized travel time `TT` from the model
    pub modeled_travel_time: f64,
    pub inconvenience: f64,
}

/// Per-link utilization over the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatistics {
    pub from: usize,
    pub to: usize,
    pub average_flow: f64,
    pub max_flow: f64,
    pub average_utilization_pct: f64,
    pub max_utilization_pct: f64,
    pub average_travel_time_increase: f64,
    pub max_travel_time_increase: f64,
}

/// Network-wide aggregates of [`LinkStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStatistics {
    pub mean_average_flow: f64,
    pub mean_average_utilization_pct: f64,
    pub mean_max_flow: f64,
    pub mean_max_utilization_pct: f64,
    pub mean_average_travel_time_increase: f64,
    pub max_flow: f64,
    pub max_utilization_pct: f64,
    pub max_travel_time_increase: f64,
    pub average_inconvenience: f64,
}

/// One row of the convergence trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub iteration: usize,
    pub tstt: f64,
    /// `None` on the first iteration
    pub relative_change: Option<f64>,
    /// `false` when the solve ended on a timeout incumbent
    pub optimal: bool,
}

/// Headline numbers of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    pub iteration: usize,
    pub tstt: f64,
    pub tstt_scaled: f64,
    pub objective_scale: f64,
    pub total_demand: f64,
    pub assigned: f64,
    pub unmet: f64,
    /// Percentage of demand assigned
    pub assignment_rate: f64,
    pub average_inconvenience: f64,
    pub capacity_slack: f64,
    pub options: usize,
    pub rejected: RejectionCounts,
    pub status: OracleStatus,
    pub solve_time_ms: u128,
    /// Congestion implied by the travel times estimated from this solve
    pub congestion: CongestionReport,
}

/// Everything reported about the last usable solve.
#[derive(Debug, Clone, Serialize)]
pub struct Iterate {
    pub iteration: usize,
    pub records: Vec<AssignmentRecord>,
    pub link_statistics: Vec<LinkStatistics>,
    pub overall: OverallStatistics,
    pub cell_flows: CellFlows,
    /// Travel times estimated from this solve
    #[serde(skip)]
    pub effective_times: TravelTimes,
    /// Options of this iteration, kept for re-deriving cell flows
    #[serde(skip)]
    pub options: OptionSet,
}

/// Primal values of one solve, read back through the model layout.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub tstt: f64,
    pub tstt_scaled: f64,
    pub assigned: f64,
    pub unmet: f64,
    pub capacity_slack: f64,
    pub average_inconvenience: f64,
    pub option_flows: Vec<f64>,
    pub option_travel_times: Vec<f64>,
    pub option_inconvenience: Vec<f64>,
    pub shortfalls: Vec<f64>,
    pub cell_flows: CellFlows,
}

/// Read the solved quantities out of `primal`.
pub fn extract(model: &EquilibriumModel, primal: &[f64], horizon_slots: usize) -> Extraction {
    let layout = &model.layout;
    let value = |v: crate::lp::VarId| primal.get(v.index()).copied().unwrap_or(0.0);

    let option_flows: Vec<f64> = layout.option_flows.iter().map(|&v| value(v).max(0.0)).collect();
    let option_travel_times: Vec<f64> = layout.travel_times.iter().map(|&v| value(v)).collect();
    let option_inconvenience: Vec<f64> = layout.inconvenience.iter().map(|&v| value(v)).collect();
    let shortfalls: Vec<f64> = layout.shortfalls.iter().map(|&v| value(v).max(0.0)).collect();

    let mut cell_flows = CellFlows::new(horizon_slots);
    let mut tstt_scaled = 0.0;
    let mut capacity_slack = 0.0;
    for cv in &layout.cells {
        cell_flows.set(cv.cell.link, cv.cell.slot, value(cv.flow).max(0.0));
        tstt_scaled += value(cv.potential);
        if let Some(s) = cv.slack {
            capacity_slack += value(s).max(0.0);
        }
    }

    let (weighted, weight) = option_flows
        .iter()
        .zip(&option_inconvenience)
        .filter(|(&y, _)| y > INCONVENIENCE_MIN_VEHICLES)
        .fold((0.0, 0.0), |(w, n), (&y, &i)| (w + i * y, n + y));
    let average_inconvenience = if weight > 0.0 { weighted / weight } else { 0.0 };

    let scale = if model.objective_scale > 0.0 {
        model.objective_scale
    } else {
        1.0
    };

    Extraction {
        tstt: tstt_scaled / scale,
        tstt_scaled,
        assigned: option_flows.iter().sum(),
        unmet: shortfalls.iter().sum(),
        capacity_slack,
        average_inconvenience,
        option_flows,
        option_travel_times,
        option_inconvenience,
        shortfalls,
        cell_flows,
    }
}

/// Assignment records for options carrying flow.
///
/// `effective_time` is priced with `effective_times`, the estimates produced
/// from this same solve.
pub fn assignment_records(
    network: &Network,
    trips: &[Trip],
    options: &OptionSet,
    extraction: &Extraction,
    effective_times: &TravelTimes,
) -> Vec<AssignmentRecord> {
    options
        .options
        .iter()
        .enumerate()
        .filter(|(i, _)| extraction.option_flows[*i] > RECORD_MIN_VEHICLES)
        .filter_map(|(i, option)| {
            let trip = trips.get(option.trip_index)?;
            let path = trip.path(option.key.path)?;
            let effective_time = path
                .links
                .iter()
                .map(|k| {
                    effective_times
                        .get(k)
                        .copied()
                        .or_else(|| network.link(k).map(|l| l.free_flow_minutes))
                        .unwrap_or(0.0)
                })
                .sum();
            Some(AssignmentRecord {
                trip: option.key.trip,
                path: option.key.path,
                departure_slot: option.key.departure_slot,
                vehicles_assigned: extraction.option_flows[i],
                demand: trip.demand,
                free_flow_time: option.free_flow_minutes,
                effective_time,
                modeled_travel_time: extraction.option_travel_times[i],
                inconvenience: extraction.option_inconvenience[i],
            })
        })
        .collect()
}

/// Utilization and delay of every link under `flows`.
pub fn link_statistics(network: &Network, law: &BprLaw, flows: &CellFlows) -> Vec<LinkStatistics> {
    let horizon = flows.horizon_slots().max(1);
    let empty = vec![0.0; horizon];
    network
        .links()
        .map(|link| {
            let key = link.key();
            let series = flows.series(&key).unwrap_or(&empty);
            let ff = link.free_flow_minutes;
            let mu = link.capacity_per_slot;

            let n = series.len().max(1) as f64;
            let average_flow = series.iter().sum::<f64>() / n;
            let max_flow = series.iter().copied().fold(0.0, f64::max);

            let (average_utilization_pct, max_utilization_pct) = if mu > 0.0 {
                let utils: Vec<f64> = series.iter().map(|x| x / mu * 100.0).collect();
                (
                    utils.iter().sum::<f64>() / n,
                    utils.iter().copied().fold(0.0, f64::max),
                )
            } else {
                (0.0, 0.0)
            };

            let increases: Vec<f64> = series.iter().map(|&x| law.latency(ff, mu, x) - ff).collect();
            LinkStatistics {
                from: key.from.value(),
                to: key.to.value(),
                average_flow,
                max_flow,
                average_utilization_pct,
                max_utilization_pct,
                average_travel_time_increase: increases.iter().sum::<f64>() / n,
                max_travel_time_increase: increases.iter().copied().fold(0.0, f64::max),
            }
        })
        .collect()
}

impl OverallStatistics {
    pub fn from_links(stats: &[LinkStatistics], average_inconvenience: f64) -> Self {
        if stats.is_empty() {
            return Self {
                average_inconvenience,
                ..Self::default()
            };
        }
        let n = stats.len() as f64;
        let mean = |f: fn(&LinkStatistics) -> f64| stats.iter().map(f).sum::<f64>() / n;
        let max = |f: fn(&LinkStatistics) -> f64| stats.iter().map(f).fold(0.0, f64::max);
        Self {
            mean_average_flow: mean(|s| s.average_flow),
            mean_average_utilization_pct: mean(|s| s.average_utilization_pct),
            mean_max_flow: mean(|s| s.max_flow),
            mean_max_utilization_pct: mean(|s| s.max_utilization_pct),
            mean_average_travel_time_increase: mean(|s| s.average_travel_time_increase),
            max_flow: max(|s| s.max_flow),
            max_utilization_pct: max(|s| s.max_utilization_pct),
            max_travel_time_increase: max(|s| s.max_travel_time_increase),
            average_inconvenience,
        }
    }
}
