//! Topology snapshots and the sources that produce them.
//!
//! A [`Topology`] is the raw input of the graph builder: the ordered list of
//! base nodes and a square visibility matrix aligned with that order.
//! Sources implement [`TopologySource`]; the engine pulls one snapshot per
//! tick, before the relay pass starts.

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::node::BaseNode;

/// Node list plus pairwise visibility at one instant.
///
/// `visibility[i][j]` is true when node `i` can see node `j`. The relation
/// is not assumed to be symmetric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<BaseNode>,
    pub visibility: Vec<Vec<bool>>,
}

impl Topology {
    /// Creates a topology from nodes and a visibility matrix.
    pub fn new(nodes: Vec<BaseNode>, visibility: Vec<Vec<bool>>) -> Self {
        Self { nodes, visibility }
    }

    /// Creates a topology whose visibility is given as pairs of base ids.
    ///
    /// Each pair `(a, b)` sets `visibility[a][b]` only; the graph builder
    /// takes care of symmetry. Unknown ids are ignored.
    pub fn from_links(nodes: Vec<BaseNode>, links: &[(&str, &str)]) -> Self {
        let n = nodes.len();
        let mut visibility = vec![vec![false; n]; n];
        let index = |id: &str| nodes.iter().position(|node| node.id == id);

        for (a, b) in links {
            if let (Some(i), Some(j)) = (index(a), index(b)) {
                visibility[i][j] = true;
            }
        }

        Self { nodes, visibility }
    }

    /// Checks that the matrix is square and aligned with the node list.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let n = self.nodes.len();
        let rows = self.visibility.len();
        if let Some(bad) = self.visibility.iter().find(|row| row.len() != n) {
            return Err(TopologyError::DimensionMismatch {
                nodes: n,
                rows,
                cols: bad.len(),
            });
        }
        if rows != n {
            return Err(TopologyError::DimensionMismatch {
                nodes: n,
                rows,
                cols: n,
            });
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(TopologyError::DuplicateNode(node.id.clone()));
            }
        }
        Ok(())
    }

    /// Finds a base node by id.
    pub fn find_node(&self, id: &str) -> Option<&BaseNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// A provider of topology snapshots.
///
/// Implementations may be backed by a geometric simulation, a static file
/// or a remote service.
pub trait TopologySource: Send {
    /// Returns the current node list and visibility matrix.
    fn snapshot(&mut self) -> Result<Topology, TopologyError>;

    /// Moves the simulated world forward by one step.
    ///
    /// Static sources ignore this.
    fn advance(&mut self) {}
}

/// A topology that never changes.
#[derive(Clone, Debug, Default)]
pub struct StaticTopology {
    topology: Topology,
}

impl StaticTopology {
    /// Wraps a fixed topology.
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// Replaces the topology returned by subsequent snapshots.
    pub fn set(&mut self, topology: Topology) {
        self.topology = topology;
    }
}

impl TopologySource for StaticTopology {
    fn snapshot(&mut self) -> Result<Topology, TopologyError> {
        self.topology.validate()?;
        Ok(self.topology.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<BaseNode> {
        vec![
            BaseNode::new("a", "A", 1, 5),
            BaseNode::new("b", "B", 1, 3),
            BaseNode::new("c", "C", 1, 5),
        ]
    }

    #[test]
    fn test_from_links() {
        let topo = Topology::from_links(nodes(), &[("a", "b"), ("b", "c"), ("x", "a")]);
        assert!(topo.visibility[0][1]);
        assert!(!topo.visibility[1][0]);
        assert!(topo.visibility[1][2]);
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_validate_dimension_mismatch() {
        let topo = Topology::new(nodes(), vec![vec![false; 3]; 2]);
        assert!(matches!(
            topo.validate(),
            Err(TopologyError::DimensionMismatch { nodes: 3, rows: 2, .. })
        ));

        let ragged = Topology::new(nodes(), vec![vec![false; 3], vec![false; 2], vec![false; 3]]);
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let mut dup = nodes();
        dup.push(BaseNode::new("a", "A again", 1, 1));
        let topo = Topology::new(dup, vec![vec![false; 4]; 4]);
        assert!(matches!(topo.validate(), Err(TopologyError::DuplicateNode(id)) if id == "a"));
    }

    #[test]
    fn test_static_source() {
        let mut source = StaticTopology::new(Topology::from_links(nodes(), &[("a", "b")]));
        source.advance();
        let snap = source.snapshot().unwrap();
        assert_eq!(snap.nodes.len(), 3);
        assert_eq!(snap.find_node("b").map(|n| n.capacity), Some(3));
        assert!(snap.find_node("z").is_none());
    }
}
