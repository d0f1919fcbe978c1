//! # satrelay
//!
//! A tick-driven relay simulation for messages moving between satellites
//! and ground stations over a changing line-of-sight network.
//!
//! ## Design Principles
//!
//! - **Port-Level Graph**: Every base node (satellite or ground station) is
//!   expanded into ports. Ports are what the router connects and what holds
//!   messages in flight.
//! - **Widest Path Routing**: Routes maximise the smallest port capacity
//!   along the path. Ties resolve to the lowest port id, so routing is
//!   reproducible.
//! - **Store-and-Forward**: A message advances at most one hop per tick and
//!   the route is recomputed at every hop against the current topology.
//! - **Reservations**: Ports holding in-flight relays are excluded from
//!   other relays' intermediate hops.
//!
//! ## Features
//!
//! - `parallel` - Compute orbital visibility matrices on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use satrelay::{InlineDispatcher, MessageStore, OrbitalTopology, RelayEngine, RetryPolicy};
//!
//! let store = Arc::new(MessageStore::new());
//! let dispatcher = Arc::new(InlineDispatcher::new(store.clone(), RetryPolicy::default()));
//! let engine = RelayEngine::new(
//!     Box::new(OrbitalTopology::earth_constellation()),
//!     dispatcher,
//! )
//! .unwrap();
//!
//! let earth = OrbitalTopology::earth_constellation();
//! let home = &earth.find_by_name("Home").unwrap().id;
//! let office = &earth.find_by_name("Office").unwrap().id;
//! engine.send_message(home, office, "Hello").unwrap();
//! engine.run_steps(10);
//!
//! println!("{}", engine.stats().summary());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use satrelay::config::SimConfig;
//!
//! let config = SimConfig::from_file("relay.yaml")?;
//! let engine = RelayEngine::from_config(&config, dispatcher)?;
//! ```

pub mod types;
pub mod error;
pub mod node;
pub mod topology;
pub mod graph;
pub mod router;
pub mod relay;
pub mod delivery;
pub mod store;
pub mod coordinator;
pub mod orbit;
pub mod engine;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{BaseId, Capacity, PortId, Tick};
pub use error::{DeliveryError, RelayError, RelayResult, TopologyError};
pub use node::{BaseNode, PortNode};
pub use topology::{StaticTopology, Topology, TopologySource};
pub use graph::Graph;
pub use router::{RouteRequest, RouteResponse};
pub use relay::{Delivery, Instruction, RelayState, SendRequest};
pub use delivery::{
    DeliveryDispatcher, DeliveryOutcome, DeliverySink, InlineDispatcher, RetryPolicy,
    TokioDispatcher,
};
pub use store::{MessageStore, StoredMessage};
pub use coordinator::{CoordinatorStats, RelayCoordinator, TickReport};
pub use orbit::{Body, OrbitalTopology, Planet};
pub use engine::{spawn_ticker, RelayEngine, TickNotice};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use stats::RelayStats;

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// satrelay::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
