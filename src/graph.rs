//! Port-level network graph and the topology builder.
//!
//! The graph is rebuilt from scratch whenever the topology changes; it is
//! never mutated incrementally. Ordered collections keep iteration order
//! deterministic, which the router relies on for reproducible tie-breaks.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TopologyError;
use crate::node::PortNode;
use crate::topology::Topology;
use crate::types::{Capacity, PortId};

/// Undirected port graph with per-port capacity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph {
    /// Port -> neighboring ports
    adjacency: BTreeMap<PortId, BTreeSet<PortId>>,
    /// Port -> capacity
    capacity: BTreeMap<PortId, Capacity>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the port graph for a topology snapshot.
    ///
    /// Every base node is expanded into its ports. For each visible pair
    /// `(i, j)` every port of `i` is connected to every port of `j` in both
    /// directions, so the adjacency is symmetric even when the matrix is
    /// not. The diagonal is ignored.
    pub fn build(topology: &Topology) -> Result<Self, TopologyError> {
        topology.validate()?;

        let mut graph = Self::new();
        let ports: Vec<Vec<PortNode>> = topology
            .nodes
            .iter()
            .map(|node| node.expand().collect())
            .collect();

        for port in ports.iter().flatten() {
            graph.add_port(port);
        }

        for (i, row) in topology.visibility.iter().enumerate() {
            for (j, &visible) in row.iter().enumerate() {
                if !visible || i == j {
                    continue;
                }
                for a in &ports[i] {
                    for b in &ports[j] {
                        graph.add_edge(&a.id, &b.id);
                    }
                }
            }
        }

        tracing::debug!(
            ports = graph.port_count(),
            edges = graph.edge_count(),
            "built port graph"
        );
        Ok(graph)
    }

    /// Adds a port with no edges. Re-adding an existing port keeps its edges.
    pub fn add_port(&mut self, port: &PortNode) {
        self.capacity.insert(port.id.clone(), port.capacity);
        self.adjacency.entry(port.id.clone()).or_default();
    }

    /// Adds an undirected edge. Parallel edges collapse into one.
    pub fn add_edge(&mut self, a: &PortId, b: &PortId) {
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone());
        self.adjacency
            .entry(b.clone())
            .or_default()
            .insert(a.clone());
    }

    /// Returns the capacity of a port, if it exists.
    pub fn capacity(&self, id: &PortId) -> Option<Capacity> {
        self.capacity.get(id).copied()
    }

    /// Returns the graph-owned id together with its capacity.
    pub(crate) fn port_entry(&self, id: &PortId) -> Option<(&PortId, Capacity)> {
        self.capacity.get_key_value(id).map(|(k, &c)| (k, c))
    }

    /// Iterates the neighbors of a port in ascending id order.
    pub fn neighbors(&self, id: &PortId) -> impl Iterator<Item = &PortId> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Returns true if the port exists.
    pub fn contains(&self, id: &PortId) -> bool {
        self.capacity.contains_key(id)
    }

    /// Returns true if `a` and `b` are adjacent.
    pub fn is_adjacent(&self, a: &PortId, b: &PortId) -> bool {
        self.adjacency.get(a).is_some_and(|n| n.contains(b))
    }

    /// Iterates all port ids in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = &PortId> {
        self.capacity.keys()
    }

    /// Number of ports.
    pub fn port_count(&self) -> usize {
        self.capacity.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Renders the adjacency as one line per port.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (port, neighbors) in &self.adjacency {
            let capacity = self.capacity.get(port).copied().unwrap_or_default();
            let list: Vec<String> = neighbors.iter().map(ToString::to_string).collect();
            out.push_str(&format!(
                "{port} (capacity: {capacity}) -> [{}]\n",
                list.join(", ")
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BaseNode;

    fn id(base: &str, port: u32) -> PortId {
        PortId::new(base, port)
    }

    #[test]
    fn test_build_expands_ports_and_connects_all_pairs() {
        let topo = Topology::from_links(
            vec![
                BaseNode::new("a", "A", 2, 4),
                BaseNode::new("b", "B", 3, 6),
            ],
            &[("a", "b")],
        );
        let graph = Graph::build(&topo).unwrap();

        assert_eq!(graph.port_count(), 5);
        assert_eq!(graph.edge_count(), 6);
        for pa in 1..=2 {
            for pb in 1..=3 {
                assert!(graph.is_adjacent(&id("a", pa), &id("b", pb)));
                assert!(graph.is_adjacent(&id("b", pb), &id("a", pa)));
            }
        }
        // Ports of the same base are not connected to each other.
        assert!(!graph.is_adjacent(&id("a", 1), &id("a", 2)));
        assert_eq!(graph.capacity(&id("b", 3)), Some(6));
    }

    #[test]
    fn test_asymmetric_input_yields_symmetric_graph() {
        let nodes = vec![
            BaseNode::new("a", "A", 1, 1),
            BaseNode::new("b", "B", 1, 1),
        ];
        let one_way = Graph::build(&Topology::from_links(nodes.clone(), &[("b", "a")])).unwrap();
        let both = Graph::build(&Topology::from_links(nodes, &[("a", "b"), ("b", "a")])).unwrap();

        assert_eq!(one_way, both);
        assert_eq!(one_way.edge_count(), 1);
    }

    #[test]
    fn test_diagonal_ignored() {
        let topo = Topology::new(
            vec![BaseNode::new("a", "A", 2, 1)],
            vec![vec![true]],
        );
        let graph = Graph::build(&topo).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.neighbors(&id("a", 1)).count(), 0);
    }

    #[test]
    fn test_build_rejects_misaligned_matrix() {
        let topo = Topology::new(vec![BaseNode::new("a", "A", 1, 1)], vec![]);
        assert!(Graph::build(&topo).is_err());
    }

    #[test]
    fn test_describe_lists_every_port() {
        let topo = Topology::from_links(
            vec![BaseNode::new("a", "A", 1, 2), BaseNode::new("b", "B", 1, 3)],
            &[("a", "b")],
        );
        let text = Graph::build(&topo).unwrap().describe();
        assert!(text.contains("a:port1 (capacity: 2) -> [b:port1]"));
        assert!(text.contains("b:port1 (capacity: 3) -> [a:port1]"));
    }
}
