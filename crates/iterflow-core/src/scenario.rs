//! The complete static input of an assignment run.

use serde::{Deserialize, Serialize};

use crate::{BackgroundTraffic, Diagnostics, Network, Trip};

/// Network, demand and background traffic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub network: Network,
    #[serde(default)]
    pub trips: Vec<Trip>,
    #[serde(default)]
    pub background: BackgroundTraffic,
}

impl Scenario {
    pub fn new(network: Network, trips: Vec<Trip>) -> Self {
        Self {
            network,
            trips,
            background: BackgroundTraffic::new(),
        }
    }

    pub fn with_background(mut self, background: BackgroundTraffic) -> Self {
        self.background = background;
        self
    }

    pub fn total_demand(&self) -> f64 {
        self.trips.iter().map(|t| t.demand).sum()
    }

    pub fn path_count(&self) -> usize {
        self.trips.iter().map(|t| t.paths.len()).sum()
    }

    /// Check the demand side against the network.
    ///
    /// Paths referencing unknown links are reported but not removed; the
    /// option generator rejects them per iteration.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        self.network.validate_into(diag);

        for trip in &self.trips {
            let entity = format!("trip {}", trip.id);
            if !trip.demand.is_finite() || trip.demand < 0.0 {
                diag.add_error_with_entity(
                    "demand",
                    &format!("Invalid demand {}", trip.demand),
                    &entity,
                );
            }
            if trip.paths.is_empty() {
                diag.add_warning_with_entity("demand", "Trip has no candidate paths", &entity);
            }
            for path in &trip.paths {
                let entity = format!("trip {} path {}", trip.id, path.id);
                if path.links.is_empty() {
                    diag.add_warning_with_entity("reference", "Path has no links", &entity);
                }
                if let Some(missing) = path.links.iter().find(|k| !self.network.contains_link(k)) {
                    diag.add_warning_with_entity(
                        "reference",
                        &format!("Path references unknown link {missing}"),
                        &entity,
                    );
                }
                if path.departure_slots.is_empty() {
                    diag.add_warning_with_entity(
                        "demand",
                        "Path has no admissible departure slots",
                        &entity,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Link, LinkKey, Node, NodeId, PathChoice, PathId, TripId};

    fn scenario() -> Scenario {
        let mut network = Network::new();
        network.add_node(Node::new(NodeId::new(1), "A"));
        network.add_node(Node::new(NodeId::new(2), "B"));
        network
            .add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 20.0))
            .unwrap();
        let good = PathChoice::new(
            PathId::new(0),
            vec![LinkKey::new(NodeId::new(1), NodeId::new(2))],
        )
        .with_departure_slots([0]);
        let bad = PathChoice::new(
            PathId::new(1),
            vec![LinkKey::new(NodeId::new(2), NodeId::new(1))],
        )
        .with_departure_slots([0]);
        let trips = vec![
            Trip::new(TripId::new(1), 10.0).with_path(good).with_path(bad),
            Trip::new(TripId::new(2), 3.0),
        ];
        Scenario::new(network, trips)
    }

    #[test]
    fn totals() {
        let s = scenario();
        assert_eq!(s.total_demand(), 13.0);
        assert_eq!(s.path_count(), 2);
    }

    #[test]
    fn validation_reports_missing_links_and_empty_trips() {
        let mut diag = Diagnostics::new();
        scenario().validate_into(&mut diag);
        assert_eq!(diag.error_count(), 0);
        assert_eq!(diag.issues_by_category("reference").count(), 1);
        assert_eq!(diag.issues_by_category("demand").count(), 1);
    }

    #[test]
    fn json_round_trip() {
        let s = scenario();
        let json = serde_json::to_string(&s).unwrap();
        let back: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trips, s.trips);
        assert_eq!(back.network.link_count(), 1);
    }
}
