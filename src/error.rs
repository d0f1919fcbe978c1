//! Error types for relay operations.
//!
//! Configuration errors live next to the configuration loader in
//! [`crate::config`]. Everything else that can fail at a boundary is
//! collected here.
//!
//! A missing route is not an error: the router reports it as
//! `None` and the coordinator treats it as "no progress this tick".

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced while obtaining or building a topology snapshot.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("visibility matrix is {rows}x{cols} but {nodes} nodes were reported")]
    DimensionMismatch {
        nodes: usize,
        rows: usize,
        cols: usize,
    },

    #[error("duplicate base node id: {0}")]
    DuplicateNode(String),

    #[error("topology source unavailable: {0}")]
    Unavailable(String),

    #[error("topology configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by a delivery sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The sink refused the message; retrying will not help.
    #[error("delivery rejected: {0}")]
    Rejected(String),

    /// The sink could not be reached; the caller may retry.
    #[error("delivery sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the relay coordinator and engine.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no free port for origin {origin} or destination {destination}")]
    PortExhausted { origin: String, destination: String },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
