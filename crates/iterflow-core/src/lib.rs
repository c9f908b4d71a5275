//! # iterflow-core: Road Network and Demand Model
//!
//! Provides the static inputs of a time-dependent traffic assignment: the road
//! network, the trips with their candidate paths, background traffic, and the
//! congestion law that turns flow into travel time.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **directed graphs** where:
//! - **Nodes**: intersections or zone centroids (descriptive only)
//! - **Edges**: directed road links with a free-flow time and per-slot capacity
//!
//! Links are addressed by [`LinkKey`] (`from`, `to`), a value-semantics
//! composite key. Flow accounting happens per *cell*, one link at one time
//! slot, which is why every per-slot quantity in the workspace is keyed by
//! `(LinkKey, slot)` rather than by concatenated strings.
//!
//! ## Quick Start
//!
//! ```rust
//! use iterflow_core::*;
//!
//! let mut network = Network::new();
//! network.add_node(Node::new(NodeId::new(1), "Depot"));
//! network.add_node(Node::new(NodeId::new(2), "Center"));
//! network
//!     .add_link(Link::new(NodeId::new(1), NodeId::new(2), 5.0, 20.0))
//!     .unwrap();
//!
//! let key = LinkKey::new(NodeId::new(1), NodeId::new(2));
//! assert_eq!(network.link(&key).unwrap().free_flow_minutes, 5.0);
//! assert_eq!(network.path_free_flow_minutes(&[key]).unwrap(), 5.0);
//! ```
//!
//! ## Modules
//!
//! - [`congestion`] - BPR latency law and Beckmann potential
//! - [`demand`] - trips, candidate paths and departure preferences
//! - [`background`] - exogenous per-slot flow
//! - [`scenario`] - the full static input of a run
//! - [`diagnostics`] - data-quality reporting

use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

pub mod background;
pub mod congestion;
pub mod demand;
pub mod diagnostics;
pub mod error;
pub mod scenario;

pub use background::{BackgroundTraffic, ClippedBackground};
pub use congestion::BprLaw;
pub use demand::{DeparturePreference, PathChoice, Trip};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{IterflowError, IterflowResult};
pub use scenario::Scenario;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl TripId {
    #[inline]
    pub fn new(value: usize) -> Self {
        TripId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl PathId {
    #[inline]
    pub fn new(value: usize) -> Self {
        PathId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TripId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of a directed link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    pub from: NodeId,
    pub to: NodeId,
}

impl LinkKey {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Intersection or zone centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            x: None,
            y: None,
        }
    }

    pub fn with_coordinates(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

/// Directed road link.
///
/// `capacity_per_slot` is the number of vehicles the link admits per time
/// slot (the hourly capacity scaled by the slot width).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub free_flow_minutes: f64,
    pub capacity_per_slot: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Link {
    pub fn new(from: NodeId, to: NodeId, free_flow_minutes: f64, capacity_per_slot: f64) -> Self {
        Self {
            from,
            to,
            free_flow_minutes,
            capacity_per_slot,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.from, self.to)
    }
}

/// Serialized shape of a [`Network`]: flat node and link lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkData {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// The road network graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "NetworkData", into = "NetworkData")]
pub struct Network {
    pub graph: DiGraph<Node, Link>,
    node_index: HashMap<NodeId, NodeIndex>,
    link_index: HashMap<LinkKey, EdgeIndex>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing the attributes of an existing node with the
    /// same id.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node.id) {
            self.graph[idx] = node;
            return idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        idx
    }

    /// Return the index of `id`, creating an unnamed node if it is new.
    pub fn ensure_node(&mut self, id: NodeId) -> NodeIndex {
        match self.node_index.get(&id) {
            Some(&idx) => idx,
            None => self.add_node(Node::new(id, "")),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|&idx| &self.graph[idx])
    }

    /// Add a directed link between two known nodes.
    pub fn add_link(&mut self, link: Link) -> Result<EdgeIndex, IterflowError> {
        let key = link.key();
        let from = *self
            .node_index
            .get(&key.from)
            .ok_or_else(|| IterflowError::Network(format!("link {key}: unknown node {}", key.from)))?;
        let to = *self
            .node_index
            .get(&key.to)
            .ok_or_else(|| IterflowError::Network(format!("link {key}: unknown node {}", key.to)))?;
        if self.link_index.contains_key(&key) {
            return Err(IterflowError::Network(format!("link {key} already exists")));
        }
        let idx = self.graph.add_edge(from, to, link);
        self.link_index.insert(key, idx);
        Ok(idx)
    }

    pub fn link(&self, key: &LinkKey) -> Option<&Link> {
        self.link_index.get(key).map(|&idx| &self.graph[idx])
    }

    pub fn contains_link(&self, key: &LinkKey) -> bool {
        self.link_index.contains_key(key)
    }

    /// Links in insertion order.
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.graph.edge_weights()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.graph.node_weights()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Sum of free-flow times along `path`.
    pub fn path_free_flow_minutes(&self, path: &[LinkKey]) -> Result<f64, IterflowError> {
        path.iter().try_fold(0.0, |acc, key| {
            self.link(key)
                .map(|l| acc + l.free_flow_minutes)
                .ok_or_else(|| IterflowError::Network(format!("unknown link {key}")))
        })
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_nodes: self.node_count(),
            num_links: self.link_count(),
            ..NetworkStats::default()
        };
        for link in self.links() {
            stats.total_capacity_per_slot += link.capacity_per_slot;
            stats.mean_free_flow_minutes += link.free_flow_minutes;
            if link.capacity_per_slot <= 0.0 {
                stats.uncapacitated_links += 1;
            }
        }
        if stats.num_links > 0 {
            stats.mean_free_flow_minutes /= stats.num_links as f64;
        }
        stats
    }

    /// Validate network data for issues that break the assignment model.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.link_count() == 0 {
            diag.add_error("structure", "Network has no links");
            return;
        }

        for link in self.links() {
            let entity = format!("link {}", link.key());
            if !link.free_flow_minutes.is_finite() || link.free_flow_minutes < 0.0 {
                diag.add_error_with_entity(
                    "link",
                    &format!("Invalid free-flow time {}", link.free_flow_minutes),
                    &entity,
                );
            }
            if !link.capacity_per_slot.is_finite() || link.capacity_per_slot < 0.0 {
                diag.add_error_with_entity(
                    "link",
                    &format!("Invalid capacity {}", link.capacity_per_slot),
                    &entity,
                );
            } else if link.capacity_per_slot == 0.0 {
                diag.add_warning_with_entity(
                    "link",
                    "Zero capacity; link is treated as uncongested",
                    &entity,
                );
            }
        }
    }
}

impl TryFrom<NetworkData> for Network {
    type Error = IterflowError;

    fn try_from(data: NetworkData) -> Result<Self, Self::Error> {
        let mut network = Network::new();
        for node in data.nodes {
            network.add_node(node);
        }
        for link in data.links {
            network.ensure_node(link.from);
            network.ensure_node(link.to);
            network.add_link(link)?;
        }
        Ok(network)
    }
}

impl From<Network> for NetworkData {
    fn from(network: Network) -> Self {
        let (nodes, edges) = network.graph.into_nodes_edges();
        NetworkData {
            nodes: nodes.into_iter().map(|n| n.weight).collect(),
            links: edges.into_iter().map(|e| e.weight).collect(),
        }
    }
}

/// Statistics about a network's size and capacity
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_nodes: usize,
    pub num_links: usize,
    pub uncapacitated_links: usize,
    pub total_capacity_per_slot: f64,
    pub mean_free_flow_minutes: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} links (mean free-flow {:.1} min, {:.0} veh/slot total capacity)",
            self.num_nodes, self.num_links, self.mean_free_flow_minutes, self.total_capacity_per_slot
        )
    }
}
