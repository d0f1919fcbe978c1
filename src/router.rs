//! Widest-path (maximum bottleneck) routing.
//!
//! The value of a path is the smallest capacity of any port on it,
//! endpoints included. The router returns a path that maximizes this value.
//! This is a maximin search: path length plays no role, and summing weights
//! as in a shortest-path search would give wrong answers.
//!
//! # Algorithm
//!
//! Best-first search over a max-heap keyed by the best known bottleneck of
//! each port. Each pop settles one port; when the destination is settled
//! the path is rebuilt from recorded predecessors. Stale heap entries are
//! skipped on pop, giving `O(E log V)`.
//!
//! Ties in the frontier go to the lowest [`PortId`], so results are
//! reproducible for a given graph.
//!
//! # Example
//!
//! ```
//! use satrelay::{BaseNode, Graph, PortId, Topology};
//! use std::collections::BTreeSet;
//!
//! let topo = Topology::from_links(
//!     vec![
//!         BaseNode::new("a", "A", 1, 5),
//!         BaseNode::new("b", "B", 1, 3),
//!         BaseNode::new("c", "C", 1, 5),
//!     ],
//!     &[("a", "b"), ("b", "c")],
//! );
//! let graph = Graph::build(&topo).unwrap();
//!
//! let path = graph
//!     .widest_path(&PortId::new("a", 1), &PortId::new("c", 1), &BTreeSet::new())
//!     .unwrap();
//! assert_eq!(path.len(), 3);
//! assert_eq!(graph.bottleneck(&path), Some(3));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use crate::error::RelayError;
use crate::graph::Graph;
use crate::types::{Capacity, PortId};

/// Heap entry: higher bottleneck first, then lower id.
#[derive(Debug, PartialEq, Eq)]
struct Frontier<'g> {
    bottleneck: Capacity,
    port: Reverse<&'g PortId>,
}

impl Ord for Frontier<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bottleneck
            .cmp(&other.bottleneck)
            .then_with(|| self.port.cmp(&other.port))
    }
}

impl PartialOrd for Frontier<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Graph {
    /// Finds the widest path from `start` to `end`.
    ///
    /// Ports in `excluded` may not appear as intermediate hops; `start` and
    /// `end` are always allowed even if listed. Returns `None` when no path
    /// exists or either endpoint is not in the graph.
    pub fn widest_path(
        &self,
        start: &PortId,
        end: &PortId,
        excluded: &BTreeSet<PortId>,
    ) -> Option<Vec<PortId>> {
        let (start, start_capacity) = self.port_entry(start)?;
        if start == end {
            return Some(vec![start.clone()]);
        }
        if !self.contains(end) {
            return None;
        }

        let mut best: HashMap<&PortId, Capacity> = HashMap::new();
        let mut prev: HashMap<&PortId, &PortId> = HashMap::new();
        let mut settled: HashSet<&PortId> = HashSet::new();
        let mut frontier = BinaryHeap::new();

        best.insert(start, start_capacity);
        frontier.push(Frontier {
            bottleneck: start_capacity,
            port: Reverse(start),
        });

        while let Some(Frontier {
            bottleneck,
            port: Reverse(current),
        }) = frontier.pop()
        {
            if settled.contains(current) || best.get(current) != Some(&bottleneck) {
                continue;
            }
            settled.insert(current);

            if current == end {
                return Some(reconstruct(&prev, start, current));
            }

            for neighbor in self.neighbors(current) {
                if settled.contains(neighbor) {
                    continue;
                }
                if neighbor != end && excluded.contains(neighbor) {
                    continue;
                }
                let Some(capacity) = self.capacity(neighbor) else {
                    continue;
                };

                let candidate = bottleneck.min(capacity);
                let improves = best.get(neighbor).map_or(true, |&known| candidate > known);
                if improves {
                    best.insert(neighbor, candidate);
                    prev.insert(neighbor, current);
                    frontier.push(Frontier {
                        bottleneck: candidate,
                        port: Reverse(neighbor),
                    });
                }
            }
        }

        None
    }

    /// Returns the minimum capacity along `path`, or `None` if the path is
    /// empty or names an unknown port.
    pub fn bottleneck(&self, path: &[PortId]) -> Option<Capacity> {
        path.iter()
            .map(|id| self.capacity(id))
            .try_fold(None, |acc: Option<Capacity>, cap| {
                cap.map(|c| Some(acc.map_or(c, |a| a.min(c))))
            })
            .flatten()
    }

    /// Answers a route query.
    pub fn route(&self, request: &RouteRequest) -> RouteResponse {
        match self.widest_path(&request.start, &request.end, &request.restricted) {
            Some(path) => RouteResponse::Found { path },
            None => RouteResponse::NotFound {
                error: format!("No path found from {} to {}", request.start, request.end),
            },
        }
    }
}

fn reconstruct(prev: &HashMap<&PortId, &PortId>, start: &PortId, end: &PortId) -> Vec<PortId> {
    let mut path = vec![end.clone()];
    let mut node = end;
    while node != start {
        match prev.get(node) {
            Some(&p) => {
                path.push(p.clone());
                node = p;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// A parsed route query: start, end and the ports to avoid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub start: PortId,
    pub end: PortId,
    #[serde(default)]
    pub restricted: BTreeSet<PortId>,
}

impl RouteRequest {
    /// Creates a request with no restrictions.
    pub fn new(start: PortId, end: PortId) -> Self {
        Self {
            start,
            end,
            restricted: BTreeSet::new(),
        }
    }

    /// Adds restricted ports.
    pub fn with_restricted(mut self, ids: impl IntoIterator<Item = PortId>) -> Self {
        self.restricted.extend(ids);
        self
    }

    /// Parses the query form `start`, `end`, `"id1,id2,..."`.
    ///
    /// Blank entries in the restricted list are skipped and whitespace is
    /// trimmed.
    pub fn parse(start: &str, end: &str, restricted: &str) -> Result<Self, RelayError> {
        let start = start.trim();
        let end = end.trim();
        if start.is_empty() || end.is_empty() {
            return Err(RelayError::MalformedRequest(
                "start and end parameters are required".to_string(),
            ));
        }

        let restricted = restricted
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<BTreeSet<PortId>, _>>()?;

        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
            restricted,
        })
    }

    /// Renders the restricted set in the comma-separated query form.
    pub fn restricted_csv(&self) -> String {
        self.restricted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Outcome of a route query.
///
/// `NotFound` is a normal answer, distinct from any transport failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteResponse {
    Found { path: Vec<PortId> },
    NotFound { error: String },
}

impl RouteResponse {
    /// Returns the path if one was found.
    pub fn path(&self) -> Option<&[PortId]> {
        match self {
            RouteResponse::Found { path } => Some(path),
            RouteResponse::NotFound { .. } => None,
        }
    }

    /// Returns true if a path was found.
    pub fn is_found(&self) -> bool {
        matches!(self, RouteResponse::Found { .. })
    }
}
