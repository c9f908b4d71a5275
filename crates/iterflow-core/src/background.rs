//! Exogenous per-slot traffic on links.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{LinkKey, Network};

/// Background flow `Z[link][slot]`.
///
/// Missing links and slots read as zero flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<BackgroundSeries>", into = "Vec<BackgroundSeries>")]
pub struct BackgroundTraffic {
    flows: BTreeMap<LinkKey, Vec<f64>>,
}

/// One link's background series in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSeries {
    pub link: LinkKey,
    pub flows: Vec<f64>,
}

/// Result of [`BackgroundTraffic::clipped`].
#[derive(Debug, Clone)]
pub struct ClippedBackground {
    pub traffic: BackgroundTraffic,
    /// Number of cells whose value was lowered to the ceiling.
    pub clipped_cells: usize,
    /// Entries referencing links absent from the network.
    pub unknown_links: usize,
}

impl BackgroundTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flow of `key` at `slot`, growing the series with zeros.
    pub fn set(&mut self, key: LinkKey, slot: usize, value: f64) {
        let series = self.flows.entry(key).or_default();
        if series.len() <= slot {
            series.resize(slot + 1, 0.0);
        }
        series[slot] = value;
    }

    pub fn insert_series(&mut self, key: LinkKey, flows: Vec<f64>) {
        self.flows.insert(key, flows);
    }

    #[inline]
    pub fn get(&self, key: &LinkKey, slot: usize) -> f64 {
        self.flows
            .get(key)
            .and_then(|series| series.get(slot))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn series(&self, key: &LinkKey) -> Option<&[f64]> {
        self.flows.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkKey, &[f64])> + '_ {
        self.flows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn link_count(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.flows.values().flatten().sum()
    }

    /// Multiply every value by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            flows: self
                .flows
                .iter()
                .map(|(k, v)| (*k, v.iter().map(|z| z * factor).collect()))
                .collect(),
        }
    }

    /// Clip each cell to `[0, ceiling(link)]`, dropping links unknown to the
    /// network.
    pub fn clipped<F>(&self, network: &Network, ceiling: F) -> ClippedBackground
    where
        F: Fn(&crate::Link) -> f64,
    {
        let mut traffic = BackgroundTraffic::new();
        let mut clipped_cells = 0;
        let mut unknown_links = 0;

        for (key, series) in &self.flows {
            let Some(link) = network.link(key) else {
                unknown_links += 1;
                continue;
            };
            let cap = ceiling(link).max(0.0);
            let values = series
                .iter()
                .map(|&z| {
                    if z > cap {
                        clipped_cells += 1;
                        cap
                    } else {
                        z.max(0.0)
                    }
                })
                .collect();
            traffic.flows.insert(*key, values);
        }

        ClippedBackground {
            traffic,
            clipped_cells,
            unknown_links,
        }
    }
}

impl From<Vec<BackgroundSeries>> for BackgroundTraffic {
    fn from(series: Vec<BackgroundSeries>) -> Self {
        Self {
            flows: series.into_iter().map(|s| (s.link, s.flows)).collect(),
        }
    }
}

impl From<BackgroundTraffic> for Vec<BackgroundSeries> {
    fn from(traffic: BackgroundTraffic) -> Self {
        traffic
            .flows
            .into_iter()
            .map(|(link, flows)| BackgroundSeries { link, flows })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Link, Node, NodeId};

    fn key(a: usize, b: usize) -> LinkKey {
        LinkKey::new(NodeId::new(a), NodeId::new(b))
    }

    #[test]
    fn missing_entries_read_as_zero() {
        let mut z = BackgroundTraffic::new();
        z.set(key(1, 2), 3, 4.0);
        assert_eq!(z.get(&key(1, 2), 3), 4.0);
        assert_eq!(z.get(&key(1, 2), 0), 0.0);
        assert_eq!(z.get(&key(1, 2), 50), 0.0);
        assert_eq!(z.get(&key(2, 1), 3), 0.0);
    }

    #[test]
    fn scaling_and_clipping() {
        let mut network = Network::new();
        network.add_node(Node::new(NodeId::new(1), "A"));
        network.add_node(Node::new(NodeId::new(2), "B"));
        network
            .add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 10.0))
            .unwrap();

        let mut z = BackgroundTraffic::new();
        z.insert_series(key(1, 2), vec![5.0, 30.0, -1.0]);
        z.insert_series(key(7, 8), vec![1.0]);

        let scaled = z.scaled(0.5);
        assert_eq!(scaled.get(&key(1, 2), 1), 15.0);

        let result = scaled.clipped(&network, |l| l.capacity_per_slot - 2.0);
        assert_eq!(result.clipped_cells, 1);
        assert_eq!(result.unknown_links, 1);
        assert_eq!(result.traffic.series(&key(1, 2)).unwrap(), &[2.5, 8.0, 0.0]);
        assert!(result.traffic.series(&key(7, 8)).is_none());
    }

    #[test]
    fn serde_round_trip() {
        let mut z = BackgroundTraffic::new();
        z.insert_series(key(1, 2), vec![1.0, 2.0]);
        let json = serde_json::to_string(&z).unwrap();
        let back: BackgroundTraffic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, z);
    }
}
