//! Time expansion: how many slots each link occupies this iteration.

use std::collections::HashMap;

use iterflow_core::{LinkKey, Network};

/// Travel-time estimate per link, in minutes.
pub type TravelTimes = HashMap<LinkKey, f64>;

/// Slots needed to traverse a link taking `minutes`, never less than one.
///
/// Unbounded times saturate at `usize::MAX`.
#[inline]
pub fn slot_duration(minutes: f64, slot_minutes: f64) -> usize {
    if !(minutes > 0.0) || !(slot_minutes > 0.0) {
        return 1;
    }
    (minutes / slot_minutes).ceil().max(1.0) as usize
}

/// Free-flow travel times of every link.
pub fn free_flow_times(network: &Network) -> TravelTimes {
    network
        .links()
        .map(|l| (l.key(), l.free_flow_minutes))
        .collect()
}

/// Per-link slot durations under the current estimates.
///
/// Links without an estimate fall back to their free-flow time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeExpansion {
    durations: HashMap<LinkKey, usize>,
}

impl TimeExpansion {
    pub fn new(network: &Network, times: &TravelTimes, slot_minutes: f64) -> Self {
        let durations = network
            .links()
            .map(|l| {
                let key = l.key();
                let minutes = times.get(&key).copied().unwrap_or(l.free_flow_minutes);
                (key, slot_duration(minutes, slot_minutes))
            })
            .collect();
        Self { durations }
    }

    pub fn duration(&self, key: &LinkKey) -> Option<usize> {
        self.durations.get(key).copied()
    }

    /// Links whose duration differs from `previous`.
    pub fn changed_since(&self, previous: &TimeExpansion) -> usize {
        self.durations
            .iter()
            .filter(|(k, d)| previous.durations.get(k) != Some(d))
            .count()
    }

    pub fn max_duration(&self) -> usize {
        self.durations.values().copied().max().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iterflow_core::{Link, Node, NodeId};

    #[test]
    fn duration_rounds_up_with_floor_of_one() {
        assert_eq!(slot_duration(5.0, 15.0), 1);
        assert_eq!(slot_duration(15.0, 15.0), 1);
        assert_eq!(slot_duration(15.01, 15.0), 2);
        assert_eq!(slot_duration(44.9, 15.0), 3);
        assert_eq!(slot_duration(0.0, 15.0), 1);
        assert_eq!(slot_duration(f64::INFINITY, 15.0), usize::MAX);
        assert_eq!(slot_duration(f64::NAN, 15.0), 1);
    }

    #[test]
    fn expansion_tracks_congested_times() {
        let mut network = Network::new();
        network.add_node(Node::new(NodeId::new(1), "A"));
        network.add_node(Node::new(NodeId::new(2), "B"));
        network
            .add_link(Link::new(NodeId::new(1), NodeId::new(2), 14.0, 20.0))
            .unwrap();
        let key = LinkKey::new(NodeId::new(1), NodeId::new(2));

        let free = TimeExpansion::new(&network, &free_flow_times(&network), 15.0);
        assert_eq!(free.duration(&key), Some(1));

        let mut times = TravelTimes::new();
        times.insert(key, 31.0);
        let congested = TimeExpansion::new(&network, &times, 15.0);
        assert_eq!(congested.duration(&key), Some(3));
        assert_eq!(congested.changed_since(&free), 1);
        assert_eq!(congested.max_duration(), 3);
    }
}
