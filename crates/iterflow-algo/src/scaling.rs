//! Global objective scaling.
//!
//! The raw Beckmann potential of a realistic instance can span many orders of
//! magnitude depending on demand, capacities and horizon length. All
//! potential and penalty coefficients are multiplied by one factor chosen so
//! that a typical objective lands near `objective_target`.

use iterflow_core::{BprLaw, Network};

/// Scale factor such that `typical_objective · scale ≈ target`.
///
/// The typical objective is the potential of a cell with mean free-flow time
/// and mean capacity carrying an even share of total demand, times the
/// number of cells.
pub fn objective_scale(
    law: &BprLaw,
    network: &Network,
    total_demand: f64,
    horizon_slots: usize,
    target: f64,
) -> f64 {
    let links = network.link_count();
    let slots = horizon_slots.max(1) as f64;
    let n = links.max(1) as f64;

    let typical_flow = total_demand / n / slots;
    let (mean_ff, mean_mu) = if links == 0 {
        (1.0, 1.0)
    } else {
        let (ff, mu) = network
            .links()
            .fold((0.0, 0.0), |(ff, mu), l| (ff + l.free_flow_minutes, mu + l.capacity_per_slot));
        (ff / n, mu / n)
    };

    let typical = law.potential(mean_ff, mean_mu, typical_flow) * links as f64 * slots;
    target / typical.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iterflow_core::{Link, Node, NodeId};

    fn single_link(ff: f64, mu: f64) -> Network {
        let mut n = Network::new();
        n.add_node(Node::new(NodeId::new(1), "A"));
        n.add_node(Node::new(NodeId::new(2), "B"));
        n.add_link(Link::new(NodeId::new(1), NodeId::new(2), ff, mu)).unwrap();
        n
    }

    #[test]
    fn scale_normalizes_typical_objective() {
        let law = BprLaw::default();
        let net = single_link(5.0, 20.0);
        let scale = objective_scale(&law, &net, 400.0, 4, 1e6);
        // typical flow 100/cell
        let typical = law.potential(5.0, 20.0, 100.0) * 4.0;
        assert!((scale * typical - 1e6).abs() < 1e-6);
    }

    #[test]
    fn tiny_instances_are_not_blown_up() {
        let law = BprLaw::default();
        let net = single_link(5.0, 20.0);
        // typical objective below 1 → denominator clamps to 1
        let scale = objective_scale(&law, &net, 0.0, 4, 1e6);
        assert_eq!(scale, 1e6);
    }
}
