//! Effective travel-time estimation from a solved flow field.
//!
//! Each link gets one travel time for the next iteration: the congestion law
//! evaluated at the link's mean cell flow. This single-point re-linearization
//! is what drives the fixed-point iteration. With [`FlowAveraging::All`] the
//! mean runs over every slot of the horizon, so a link that is saturated only
//! during a short peak ends up with a mild estimate.

use iterflow_core::{BprLaw, Network};
use serde::Serialize;

use crate::config::FlowAveraging;
use crate::expansion::TravelTimes;
use crate::results::CellFlows;

/// Links whose effective time exceeds this multiple of free flow count as
/// congested in the report.
pub const CONGESTED_FACTOR: f64 = 1.5;

/// Summary of `effective / free-flow` ratios.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CongestionReport {
    pub average_factor: f64,
    pub max_factor: f64,
    pub congested_links: usize,
}

impl CongestionReport {
    /// Ratios over links with positive free-flow time.
    pub fn from_times(network: &Network, times: &TravelTimes) -> Self {
        let factors: Vec<f64> = network
            .links()
            .filter(|l| l.free_flow_minutes > 0.0)
            .map(|l| {
                times
                    .get(&l.key())
                    .map_or(1.0, |t| t / l.free_flow_minutes)
            })
            .collect();
        if factors.is_empty() {
            return Self::default();
        }
        Self {
            average_factor: factors.iter().sum::<f64>() / factors.len() as f64,
            max_factor: factors.iter().copied().fold(0.0, f64::max),
            congested_links: factors.iter().filter(|&&f| f > CONGESTED_FACTOR).count(),
        }
    }
}

/// Mean of a link's cell flows under `mode`.
pub fn average_flow(series: &[f64], mode: FlowAveraging) -> f64 {
    match mode {
        FlowAveraging::All => {
            if series.is_empty() {
                0.0
            } else {
                series.iter().sum::<f64>() / series.len() as f64
            }
        }
        FlowAveraging::Positive => {
            let (sum, n) = series
                .iter()
                .filter(|&&x| x > 0.0)
                .fold((0.0, 0usize), |(s, n), &x| (s + x, n + 1));
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        }
    }
}

/// Congested travel time of every link at its mean flow.
pub fn estimate_travel_times(
    network: &Network,
    law: &BprLaw,
    flows: &CellFlows,
    mode: FlowAveraging,
) -> TravelTimes {
    network
        .links()
        .map(|link| {
            let key = link.key();
            let mean = flows
                .series(&key)
                .map_or(0.0, |series| average_flow(series, mode));
            let time = law.latency(link.free_flow_minutes, link.capacity_per_slot, mean);
            (key, time)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iterflow_core::{Link, LinkKey, Node, NodeId};

    fn network() -> Network {
        let mut n = Network::new();
        n.add_node(Node::new(NodeId::new(1), "A"));
        n.add_node(Node::new(NodeId::new(2), "B"));
        n.add_link(Link::new(NodeId::new(1), NodeId::new(2), 10.0, 20.0)).unwrap();
        n
    }

    fn key() -> LinkKey {
        LinkKey::new(NodeId::new(1), NodeId::new(2))
    }

    #[test]
    fn averaging_modes_differ_on_peaky_flow() {
        let series = [0.0, 0.0, 40.0, 0.0];
        assert_eq!(average_flow(&series, FlowAveraging::All), 10.0);
        assert_eq!(average_flow(&series, FlowAveraging::Positive), 40.0);
        assert_eq!(average_flow(&[], FlowAveraging::All), 0.0);
        assert_eq!(average_flow(&[0.0], FlowAveraging::Positive), 0.0);
    }

    #[test]
    fn all_slot_averaging_understates_peak_congestion() {
        let net = network();
        let law = BprLaw::default();
        let mut flows = CellFlows::new(4);
        flows.set(key(), 2, 40.0);

        let all = estimate_travel_times(&net, &law, &flows, FlowAveraging::All);
        let peak = estimate_travel_times(&net, &law, &flows, FlowAveraging::Positive);
        // mean 10 veh: 10 · (1 + 0.15 · 0.5^4)
        assert!((all[&key()] - 10.0 * (1.0 + 0.15 * 0.0625)).abs() < 1e-12);
        // peak 40 veh: 10 · (1 + 0.15 · 2^4)
        assert!((peak[&key()] - 34.0).abs() < 1e-12);
        assert!(peak[&key()] > all[&key()]);
    }

    #[test]
    fn empty_link_keeps_free_flow() {
        let net = network();
        let times = estimate_travel_times(
            &net,
            &BprLaw::default(),
            &CellFlows::new(4),
            FlowAveraging::All,
        );
        assert_eq!(times[&key()], 10.0);
    }

    #[test]
    fn congestion_report() {
        let net = network();
        let mut times = TravelTimes::new();
        times.insert(key(), 20.0);
        let report = CongestionReport::from_times(&net, &times);
        assert_eq!(report.average_factor, 2.0);
        assert_eq!(report.max_factor, 2.0);
        assert_eq!(report.congested_links, 1);
    }
}
