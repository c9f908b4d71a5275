//! Option generation: feasible (trip, path, departure slot) triples.
//!
//! For each trip the generator
//! 1. prices every candidate path with the current link travel times,
//! 2. drops paths slower than `(1 + gamma)` times the fastest one,
//! 3. walks each surviving path from every admissible departure slot,
//!    accumulating slot offsets from the link durations, and keeps the
//!    departures whose last occupied cell is inside the horizon.
//!
//! Every dropped path or departure is counted under a [`RejectReason`] so
//! that data problems show up in the run report instead of vanishing.

use std::collections::BTreeMap;

use iterflow_core::{LinkKey, Network, PathChoice, PathId, Trip, TripId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AssignmentConfig;
use crate::expansion::{TimeExpansion, TravelTimes};

/// One link at one time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Cell {
    pub link: LinkKey,
    pub slot: usize,
}

impl Cell {
    pub fn new(link: LinkKey, slot: usize) -> Self {
        Self { link, slot }
    }
}

/// Composite key of an assignment option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OptionKey {
    pub trip: TripId,
    pub path: PathId,
    pub departure_slot: usize,
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.trip, self.path, self.departure_slot)
    }
}

/// A feasible way to serve part of a trip's demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentOption {
    pub key: OptionKey,
    /// Position of the trip in the scenario's trip list
    pub trip_index: usize,
    /// Sum of link free-flow times
    pub free_flow_minutes: f64,
    /// Path time under the estimates this option was generated with
    pub estimated_minutes: f64,
    /// Occupied cells in traversal order
    pub cells: Vec<Cell>,
}

/// Why a candidate path or departure produced no option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Path references a link absent from the network
    MissingLink,
    /// Path slower than `(1 + gamma)` times the fastest path
    GammaFiltered,
    /// Departure outside the path's day window
    PreferenceWindow,
    /// Traversal would run past the last slot
    BeyondHorizon,
    /// Path lists no departure slots
    NoDepartureSlots,
}

impl RejectReason {
    pub const ALL: [RejectReason; 5] = [
        RejectReason::MissingLink,
        RejectReason::GammaFiltered,
        RejectReason::PreferenceWindow,
        RejectReason::BeyondHorizon,
        RejectReason::NoDepartureSlots,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingLink => "missing_link",
            RejectReason::GammaFiltered => "gamma_filtered",
            RejectReason::PreferenceWindow => "preference_window",
            RejectReason::BeyondHorizon => "beyond_horizon",
            RejectReason::NoDepartureSlots => "no_departure_slots",
        }
    }
}

/// Rejections per reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RejectionCounts {
    counts: BTreeMap<RejectReason, usize>,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: RejectReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: RejectReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        for (reason, n) in &other.counts {
            *self.counts.entry(*reason).or_insert(0) += n;
        }
    }
}

impl std::fmt::Display for RejectionCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.counts.is_empty() {
            return f.write_str("none");
        }
        let parts: Vec<String> = self
            .counts
            .iter()
            .map(|(r, n)| format!("{}={}", r.as_str(), n))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Filtering parameters of the generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionRules {
    pub gamma: f64,
    pub horizon_slots: usize,
    pub day_boundary_slot: usize,
}

impl From<&AssignmentConfig> for OptionRules {
    fn from(cfg: &AssignmentConfig) -> Self {
        Self {
            gamma: cfg.gamma,
            horizon_slots: cfg.horizon_slots,
            day_boundary_slot: cfg.day_boundary_slot,
        }
    }
}

/// All options of one iteration plus the cell incidence map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptionSet {
    pub options: Vec<AssignmentOption>,
    pub rejected: RejectionCounts,
    /// Trips left without any option
    pub trips_without_options: Vec<TripId>,
    /// Cell → indices into `options` of every option occupying it
    pub incidence: BTreeMap<Cell, Vec<usize>>,
}

impl OptionSet {
    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Number of (option, cell) incidence entries.
    pub fn incidence_entries(&self) -> usize {
        self.options.iter().map(|o| o.cells.len()).sum()
    }

    pub fn options_of_trip(&self, trip_index: usize) -> impl Iterator<Item = (usize, &AssignmentOption)> + '_ {
        self.options
            .iter()
            .enumerate()
            .filter(move |(_, o)| o.trip_index == trip_index)
    }

    pub fn position(&self, key: &OptionKey) -> Option<usize> {
        self.options.iter().position(|o| &o.key == key)
    }
}

struct TripOptions {
    options: Vec<AssignmentOption>,
    rejected: RejectionCounts,
}

/// Enumerate the options of every trip.
///
/// The result is deterministic: options follow trip order, then path order,
/// then ascending departure slot.
pub fn generate_options(
    network: &Network,
    trips: &[Trip],
    times: &TravelTimes,
    expansion: &TimeExpansion,
    rules: OptionRules,
) -> OptionSet {
    let per_trip: Vec<TripOptions> = {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            trips
                .par_iter()
                .enumerate()
                .map(|(idx, trip)| trip_options(network, idx, trip, times, expansion, rules))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            trips
                .iter()
                .enumerate()
                .map(|(idx, trip)| trip_options(network, idx, trip, times, expansion, rules))
                .collect()
        }
    };

    let mut set = OptionSet::default();
    for (trip, generated) in trips.iter().zip(per_trip) {
        set.rejected.merge(&generated.rejected);
        if generated.options.is_empty() {
            warn!(
                trip = %trip.id,
                demand = trip.demand,
                "trip has no feasible options; its demand goes to the shortfall"
            );
            set.trips_without_options.push(trip.id);
        }
        for option in generated.options {
            let idx = set.options.len();
            for cell in &option.cells {
                set.incidence.entry(*cell).or_default().push(idx);
            }
            set.options.push(option);
        }
    }

    debug!(
        options = set.options.len(),
        incidence = set.incidence_entries(),
        rejected = %set.rejected,
        "generated options"
    );
    set
}

fn path_minutes(path: &PathChoice, network: &Network, times: &TravelTimes) -> Option<f64> {
    path.links.iter().try_fold(0.0, |acc, key| {
        let link = network.link(key)?;
        Some(acc + times.get(key).copied().unwrap_or(link.free_flow_minutes))
    })
}

/// Cells occupied by a departure at `tau`, or `None` past the horizon.
fn occupied_cells(
    path: &PathChoice,
    tau: usize,
    expansion: &TimeExpansion,
    horizon_slots: usize,
) -> Option<Vec<Cell>> {
    let mut cells = Vec::new();
    let mut offset = 0;
    for key in &path.links {
        let dur = expansion.duration(key)?;
        let start = tau.checked_add(offset)?;
        let end = start.checked_add(dur)?;
        if end > horizon_slots {
            return None;
        }
        cells.extend((start..end).map(|slot| Cell::new(*key, slot)));
        offset += dur;
    }
    Some(cells)
}

fn trip_options(
    network: &Network,
    trip_index: usize,
    trip: &Trip,
    times: &TravelTimes,
    expansion: &TimeExpansion,
    rules: OptionRules,
) -> TripOptions {
    let mut rejected = RejectionCounts::default();
    let mut priced: Vec<(&PathChoice, f64)> = Vec::with_capacity(trip.paths.len());

    for path in &trip.paths {
        if path.links.is_empty() {
            rejected.record(RejectReason::MissingLink);
            continue;
        }
        let Some(minutes) = path_minutes(path, network, times) else {
            rejected.record(RejectReason::MissingLink);
            continue;
        };
        if path.departure_slots.is_empty() {
            rejected.record(RejectReason::NoDepartureSlots);
            continue;
        }
        priced.push((path, minutes));
    }

    let mut options = Vec::new();
    let Some(fastest) = priced.iter().map(|(_, m)| *m).reduce(f64::min) else {
        return TripOptions { options, rejected };
    };
    let cutoff = (1.0 + rules.gamma) * fastest;

    for (path, minutes) in priced {
        if minutes > cutoff {
            rejected.record(RejectReason::GammaFiltered);
            continue;
        }
        let free_flow = path
            .links
            .iter()
            .filter_map(|k| network.link(k))
            .map(|l| l.free_flow_minutes)
            .sum();

        for &tau in &path.departure_slots {
            if !path.preference.admits(tau, rules.day_boundary_slot) {
                rejected.record(RejectReason::PreferenceWindow);
                continue;
            }
            let Some(cells) = occupied_cells(path, tau, expansion, rules.horizon_slots) else {
                rejected.record(RejectReason::BeyondHorizon);
                continue;
            };
            options.push(AssignmentOption {
                key: OptionKey {
                    trip: trip.id,
                    path: path.id,
                    departure_slot: tau,
                },
                trip_index,
                free_flow_minutes: free_flow,
                estimated_minutes: minutes,
                cells,
            });
        }
    }

    TripOptions { options, rejected }
}
