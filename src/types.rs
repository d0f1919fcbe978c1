//! Core type definitions for the relay simulation.
//!
//! This module defines the identifiers and scalar types shared by the
//! topology builder, the router and the relay coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

/// Discrete simulation step counter.
///
/// One tick is one pass of the relay coordinator. Every relay advances by
/// at most one hop per tick.
pub type Tick = u64;

/// Integer throughput rating of a node ("portgen").
///
/// Used as the bottleneck weight in path selection. Signed so that a
/// topology source can report an unknown capacity as a negative value.
pub type Capacity = i64;

/// Identifier of a physical node (satellite or ground station).
pub type BaseId = String;

/// Identifier of one relay-addressable port of a base node.
///
/// Ports are numbered from 1. The owning base id is carried explicitly.
/// The textual form `"<base>:port<n>"` is the wire format used by the
/// route query protocol.
///
/// Ordering is by base id, then port index; it is the tie-break order used
/// throughout the crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortId {
    base: BaseId,
    port: u32,
}

impl PortId {
    /// Creates a port identifier for the given base node and 1-based port index.
    pub fn new(base: impl Into<BaseId>, port: u32) -> Self {
        Self {
            base: base.into(),
            port,
        }
    }

    /// Returns the id of the owning base node.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the 1-based port index.
    pub fn port(&self) -> u32 {
        self.port
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:port{}", self.base, self.port)
    }
}

impl FromStr for PortId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RelayError::MalformedRequest(format!("invalid port id: {s:?}"));

        let (base, port) = s.rsplit_once(":port").ok_or_else(malformed)?;
        if base.is_empty() {
            return Err(malformed());
        }
        let port: u32 = port.parse().map_err(|_| malformed())?;
        if port == 0 {
            return Err(malformed());
        }
        Ok(Self::new(base, port))
    }
}

impl TryFrom<String> for PortId {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortId> for String {
    fn from(id: PortId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_id_display_and_parse() {
        let id = PortId::new("sat_1a2b3", 2);
        assert_eq!(id.to_string(), "sat_1a2b3:port2");
        assert_eq!(id.base(), "sat_1a2b3");
        assert_eq!(id.port(), 2);

        let parsed: PortId = "sat_1a2b3:port2".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_port_id_rejects_garbage() {
        assert!("sat_1".parse::<PortId>().is_err());
        assert!(":port1".parse::<PortId>().is_err());
        assert!("sat_1:port".parse::<PortId>().is_err());
        assert!("sat_1:port0".parse::<PortId>().is_err());
        assert!("sat_1:portx".parse::<PortId>().is_err());
    }

    #[test]
    fn test_port_id_ordering() {
        let mut ids = vec![
            PortId::new("b", 1),
            PortId::new("a", 2),
            PortId::new("a", 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![PortId::new("a", 1), PortId::new("a", 2), PortId::new("b", 1)]
        );
    }

    #[test]
    fn test_port_id_serde_uses_wire_form() {
        let id = PortId::new("srv_9", 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"srv_9:port3\"");
        let back: PortId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
