//! Configuration system for relay simulations.
//!
//! This module provides YAML/JSON configuration file support for defining
//! a relay run declaratively.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   name: two-node link
//!   log_level: info
//!   tick_interval_ms: 5
//!   collect_stats: true
//!
//! delivery:
//!   attempts: 3
//!   retry_delay_ms: 500
//!
//! topology:
//!   kind: static
//!   nodes:
//!     - { id: a, name: Alpha, ports: 1, portgen: 5 }
//!     - { id: b, name: Bravo, ports: 2, portgen: 3 }
//!   links:
//!     - [a, b]
//! ```
//!
//! `topology.kind` is one of `static` (nodes plus either a `visibility`
//! matrix or `links`), `orbital` (a planet and its bodies) or `earth`
//! (the built-in constellation, the default).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::delivery::RetryPolicy;
use crate::node::BaseNode;
use crate::orbit::{Body, OrbitalTopology, Planet};
use crate::topology::{StaticTopology, Topology, TopologySource};
use crate::types::Capacity;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global run parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Run name shown in statistics
    #[serde(default)]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Wall-clock pause between ticks when the engine drives itself
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Whether to collect detailed statistics (per-tick wall time)
    #[serde(default)]
    pub collect_stats: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_ms() -> u64 {
    5
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            log_level: default_log_level(),
            tick_interval_ms: default_tick_interval_ms(),
            collect_stats: false,
        }
    }
}

impl SimulationParams {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Delivery retry parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryParams {
    /// Total attempts per delivery, including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for DeliveryParams {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl DeliveryParams {
    /// The retry policy described by these parameters.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Kind of orbital body in a configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Satellite,
    GroundStation,
}

/// Configuration for one orbital body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyConfig {
    pub name: String,

    pub kind: BodyKind,

    /// Overrides the id derived from the name
    #[serde(default)]
    pub id: Option<String>,

    /// Ignored for ground stations, which sit on the planet surface
    #[serde(default)]
    pub orbit_radius: f64,

    /// Initial angle in radians
    #[serde(default)]
    pub theta: f64,

    /// Ignored for ground stations, which rotate with the planet
    #[serde(default)]
    pub angular_speed: f64,

    #[serde(default = "default_ports")]
    pub ports: u32,

    #[serde(rename = "portgen")]
    pub capacity: Capacity,
}

fn default_ports() -> u32 {
    1
}

impl BodyConfig {
    fn to_body(&self, planet: &Planet) -> Body {
        let mut body = match self.kind {
            BodyKind::Satellite => Body::satellite(
                self.name.clone(),
                self.orbit_radius,
                self.theta,
                self.angular_speed,
                self.ports,
                self.capacity,
            ),
            BodyKind::GroundStation => Body::ground_station(
                self.name.clone(),
                planet,
                self.theta,
                self.ports,
                self.capacity,
            ),
        };
        if let Some(id) = &self.id {
            body.id = id.clone();
        }
        body
    }
}

/// Where topology snapshots come from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TopologyConfig {
    /// A fixed node list with either a full matrix or a list of links.
    Static {
        nodes: Vec<BaseNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visibility: Option<Vec<Vec<bool>>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        links: Vec<(String, String)>,
    },

    /// A planet and the bodies around it.
    Orbital {
        planet: Planet,
        #[serde(default)]
        bodies: Vec<BodyConfig>,
    },

    /// The built-in Earth constellation.
    #[default]
    Earth,
}

impl TopologyConfig {
    /// Validates the topology section.
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            TopologyConfig::Static {
                nodes,
                visibility,
                links,
            } => {
                if visibility.is_some() && !links.is_empty() {
                    return Err(ConfigError::Validation(
                        "static topology sets both visibility and links".to_string(),
                    ));
                }
                let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
                for (a, b) in links {
                    for id in [a, b] {
                        if !known.contains(id.as_str()) {
                            return Err(ConfigError::Validation(format!(
                                "Link references non-existent node: {id}"
                            )));
                        }
                    }
                }
                self.static_topology()
                    .validate()
                    .map_err(|e| ConfigError::Validation(e.to_string()))
            }
            TopologyConfig::Orbital { planet, bodies } => {
                if !(planet.radius.is_finite() && planet.radius > 0.0) {
                    return Err(ConfigError::Validation(format!(
                        "Planet {} must have a positive radius",
                        planet.name
                    )));
                }
                let mut ids = HashSet::new();
                for config in bodies {
                    if config.kind == BodyKind::Satellite && config.orbit_radius < planet.radius {
                        return Err(ConfigError::Validation(format!(
                            "Satellite {} orbits inside planet {}",
                            config.name, planet.name
                        )));
                    }
                    let body = config.to_body(planet);
                    if !ids.insert(body.id.clone()) {
                        return Err(ConfigError::Validation(format!(
                            "Duplicate body ID: {}",
                            body.id
                        )));
                    }
                }
                Ok(())
            }
            TopologyConfig::Earth => Ok(()),
        }
    }

    fn static_topology(&self) -> Topology {
        match self {
            TopologyConfig::Static {
                nodes,
                visibility: Some(matrix),
                ..
            } => Topology::new(nodes.clone(), matrix.clone()),
            TopologyConfig::Static { nodes, links, .. } => {
                let pairs: Vec<(&str, &str)> =
                    links.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
                Topology::from_links(nodes.clone(), &pairs)
            }
            _ => Topology::default(),
        }
    }

    fn orbital(&self) -> Option<OrbitalTopology> {
        match self {
            TopologyConfig::Orbital { planet, bodies } => Some(OrbitalTopology::new(
                planet.clone(),
                bodies.iter().map(|b| b.to_body(planet)).collect(),
            )),
            TopologyConfig::Earth => Some(OrbitalTopology::earth_constellation()),
            TopologyConfig::Static { .. } => None,
        }
    }

    /// Builds the topology source described by this section.
    pub fn source(&self) -> ConfigResult<Box<dyn TopologySource>> {
        self.validate()?;
        Ok(match self.orbital() {
            Some(orbit) => Box::new(orbit),
            None => Box::new(StaticTopology::new(self.static_topology())),
        })
    }
}

/// Complete run configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global run parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Delivery retry parameters
    #[serde(default)]
    pub delivery: DeliveryParams,

    /// Topology source
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl SimConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.simulation.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.delivery.attempts == 0 {
            return Err(ConfigError::Validation(
                "delivery.attempts must be at least 1".to_string(),
            ));
        }
        self.topology.validate()
    }

    /// Builds the topology source described by the `topology` section.
    pub fn topology_source(&self) -> ConfigResult<Box<dyn TopologySource>> {
        self.topology.source()
    }

    /// The delivery retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.delivery.retry_policy()
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.simulation.name = name.into();
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Sets the pause between ticks.
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.simulation.tick_interval_ms = ms;
        self
    }

    /// Enables per-tick wall-time measurement.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Sets the delivery retry parameters.
    pub fn delivery(mut self, attempts: u32, retry_delay_ms: u64) -> Self {
        self.config.delivery = DeliveryParams {
            attempts,
            retry_delay_ms,
        };
        self
    }

    /// Uses a static topology given as links between base ids.
    pub fn static_links(mut self, nodes: Vec<BaseNode>, links: &[(&str, &str)]) -> Self {
        self.config.topology = TopologyConfig::Static {
            nodes,
            visibility: None,
            links: links
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        };
        self
    }

    /// Uses a static topology given as a full visibility matrix.
    pub fn static_matrix(mut self, nodes: Vec<BaseNode>, visibility: Vec<Vec<bool>>) -> Self {
        self.config.topology = TopologyConfig::Static {
            nodes,
            visibility: Some(visibility),
            links: Vec::new(),
        };
        self
    }

    /// Uses an orbital topology.
    pub fn orbital(mut self, planet: Planet, bodies: Vec<BodyConfig>) -> Self {
        self.config.topology = TopologyConfig::Orbital { planet, bodies };
        self
    }

    /// Uses the built-in Earth constellation.
    pub fn earth(mut self) -> Self {
        self.config.topology = TopologyConfig::Earth;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
