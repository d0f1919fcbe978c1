//! Physical and port-level node definitions.
//!
//! A [`BaseNode`] is a satellite or ground station as reported by the
//! topology source. Each base node is expanded into one [`PortNode`] per
//! port; ports are the units that hold and forward instructions.

use serde::{Deserialize, Serialize};

use crate::types::{BaseId, Capacity, PortId};

/// A physical node in the network.
///
/// Immutable for the lifetime of one topology snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseNode {
    /// Unique identifier (e.g. `sat_6c3a7`)
    pub id: BaseId,
    /// Human readable name
    pub name: String,
    /// Number of relay ports. Zero is treated as one.
    #[serde(default = "default_ports")]
    pub ports: u32,
    /// Throughput rating shared by every port of this node
    #[serde(rename = "portgen")]
    pub capacity: Capacity,
}

fn default_ports() -> u32 {
    1
}

impl BaseNode {
    /// Creates a new base node.
    pub fn new(
        id: impl Into<BaseId>,
        name: impl Into<String>,
        ports: u32,
        capacity: Capacity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ports,
            capacity,
        }
    }

    /// Number of ports after applying the one-port minimum.
    pub fn port_count(&self) -> u32 {
        self.ports.max(1)
    }

    /// Expands this node into its port nodes, in port order.
    pub fn expand(&self) -> impl Iterator<Item = PortNode> + '_ {
        (1..=self.port_count()).map(move |port| PortNode {
            id: PortId::new(self.id.clone(), port),
            name: format!("{} (port {})", self.name, port),
            capacity: self.capacity,
        })
    }
}

/// One relay-addressable unit of a [`BaseNode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortNode {
    pub id: PortId,
    pub name: String,
    pub capacity: Capacity,
}

impl PortNode {
    /// Returns the id of the owning base node.
    pub fn base(&self) -> &str {
        self.id.base()
    }
}
