//! Geometric topology source: bodies on circular orbits around a planet.
//!
//! Satellites orbit at a fixed radius; ground stations sit on the planet
//! surface and rotate with it. Every [`advance`](TopologySource::advance)
//! adds each body's angular speed to its angle, and every snapshot
//! recomputes line-of-sight visibility between all pairs of bodies.
//!
//! With the `parallel` feature the visibility matrix rows are computed on
//! the rayon pool.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::TopologyError;
use crate::node::BaseNode;
use crate::topology::{Topology, TopologySource};
use crate::types::Capacity;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// The occluding body at the origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub name: String,
    pub radius: f64,
    /// Radians per step, inherited by ground stations
    pub angular_speed: f64,
}

impl Planet {
    pub fn new(name: impl Into<String>, radius: f64, angular_speed: f64) -> Self {
        Self {
            name: name.into(),
            radius,
            angular_speed,
        }
    }
}

/// A satellite or ground station.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: String,
    pub name: String,
    pub orbit_radius: f64,
    /// Current angle in radians
    pub theta: f64,
    /// Radians per step
    pub angular_speed: f64,
    #[serde(default = "default_ports")]
    pub ports: u32,
    #[serde(rename = "portgen")]
    pub capacity: Capacity,
}

fn default_ports() -> u32 {
    1
}

/// Five hex digits of the name hash, prefixed with the body kind.
fn derive_id(prefix: &str, name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex();
    format!("{prefix}_{}", &hash.as_str()[..5])
}

impl Body {
    /// Creates a satellite with an id derived from its name (`sat_xxxxx`).
    pub fn satellite(
        name: impl Into<String>,
        orbit_radius: f64,
        theta: f64,
        angular_speed: f64,
        ports: u32,
        capacity: Capacity,
    ) -> Self {
        let name = name.into();
        Self {
            id: derive_id("sat", &name),
            name,
            orbit_radius,
            theta,
            angular_speed,
            ports,
            capacity,
        }
    }

    /// Creates a ground station on the surface of `planet` (`srv_xxxxx`).
    pub fn ground_station(
        name: impl Into<String>,
        planet: &Planet,
        theta: f64,
        ports: u32,
        capacity: Capacity,
    ) -> Self {
        let name = name.into();
        Self {
            id: derive_id("srv", &name),
            name,
            orbit_radius: planet.radius,
            theta,
            angular_speed: planet.angular_speed,
            ports,
            capacity,
        }
    }

    /// Cartesian position.
    pub fn position(&self) -> (f64, f64) {
        (
            self.orbit_radius * self.theta.cos(),
            self.orbit_radius * self.theta.sin(),
        )
    }

    /// Moves one step along the orbit.
    pub fn advance(&mut self) {
        self.theta += self.angular_speed;
    }

    /// Line-of-sight test against `other` around a planet of `planet_radius`.
    ///
    /// `d` is the distance from the origin to the line through both
    /// positions and `t` the projection parameter of the origin onto the
    /// segment. The sight line is clear when it passes outside the planet or
    /// the closest approach falls outside the segment.
    pub fn can_see(&self, other: &Body, planet_radius: f64) -> bool {
        let (x1, y1) = self.position();
        let (x2, y2) = other.position();

        let a = x2 - x1;
        let b = y2 - y1;
        let len2 = a * a + b * b;
        if len2 == 0.0 {
            return true;
        }

        let c = x2 * y1 - x1 * y2;
        let d = c.abs() / len2.sqrt();
        let t = (a * -x1 + b * -y1) / len2;

        d >= planet_radius || t < 0.0 || t > planet_radius
    }

    /// The relay-facing view of this body.
    pub fn to_base_node(&self) -> BaseNode {
        BaseNode::new(self.id.clone(), self.name.clone(), self.ports, self.capacity)
    }
}

/// A planet and the bodies around it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitalTopology {
    pub planet: Planet,
    pub bodies: Vec<Body>,
}

impl OrbitalTopology {
    pub fn new(planet: Planet, bodies: Vec<Body>) -> Self {
        Self { planet, bodies }
    }

    /// Three inner satellites, three outer satellites and two ground
    /// stations around a unit-radius Earth.
    pub fn earth_constellation() -> Self {
        let planet = Planet::new("Earth", 1.0, PI / 20480.0);
        let third = 2.0 * PI / 3.0;
        let inner = 2f64.sqrt();

        let bodies = vec![
            Body::satellite("Gonzalito", inner, 3.0 * third, PI / 5120.0, 1, 6),
            Body::satellite("Giovanni", inner, 2.0 * third, PI / 5120.0, 1, 6),
            Body::satellite("Martina", inner, third, PI / 5120.0, 1, 6),
            Body::satellite("Bonnie", 3.0, 3.0 * third, PI / 10240.0, 3, 3),
            Body::satellite("Kissie", 3.0, 2.0 * third, PI / 10240.0, 3, 3),
            Body::satellite("Honey", 3.0, third, PI / 10240.0, 3, 3),
            Body::ground_station("Home", &planet, 0.0, 2, 2),
            Body::ground_station("Office", &planet, PI, 6, 7),
        ];

        Self { planet, bodies }
    }

    /// Finds a body by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Body> {
        self.bodies.iter().find(|b| b.name == name)
    }

    fn visibility_row(&self, i: usize) -> Vec<bool> {
        let radius = self.planet.radius;
        let from = &self.bodies[i];
        self.bodies
            .iter()
            .enumerate()
            .map(|(j, to)| i != j && from.can_see(to, radius))
            .collect()
    }

    /// Pairwise visibility matrix. The diagonal is always false.
    pub fn visibility(&self) -> Vec<Vec<bool>> {
        #[cfg(feature = "parallel")]
        {
            (0..self.bodies.len())
                .into_par_iter()
                .map(|i| self.visibility_row(i))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            (0..self.bodies.len())
                .map(|i| self.visibility_row(i))
                .collect()
        }
    }

    fn validate(&self) -> Result<(), TopologyError> {
        if !(self.planet.radius.is_finite() && self.planet.radius > 0.0) {
            return Err(TopologyError::Unavailable(format!(
                "planet {} has invalid radius {}",
                self.planet.name, self.planet.radius
            )));
        }
        if let Some(body) = self
            .bodies
            .iter()
            .find(|b| !(b.theta.is_finite() && b.orbit_radius.is_finite()))
        {
            return Err(TopologyError::Unavailable(format!(
                "body {} has a non-finite position",
                body.name
            )));
        }
        Ok(())
    }
}

impl TopologySource for OrbitalTopology {
    fn snapshot(&mut self) -> Result<Topology, TopologyError> {
        self.validate()?;
        let topology = Topology::new(
            self.bodies.iter().map(Body::to_base_node).collect(),
            self.visibility(),
        );
        topology.validate()?;
        Ok(topology)
    }

    fn advance(&mut self) {
        for body in &mut self.bodies {
            body.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_planet() -> Planet {
        Planet::new("P", 1.0, 0.0)
    }

    fn at(name: &str, r: f64, theta: f64) -> Body {
        Body::satellite(name, r, theta, 0.0, 1, 1)
    }

    #[test]
    fn test_ids_are_stable_and_prefixed() {
        let a = Body::satellite("Bonnie", 3.0, 0.0, 0.0, 3, 3);
        let b = Body::satellite("Bonnie", 1.0, 1.0, 1.0, 1, 1);
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("sat_"));
        assert_eq!(a.id.len(), 9);

        let home = Body::ground_station("Home", &unit_planet(), 0.0, 2, 2);
        assert!(home.id.starts_with("srv_"));
        assert_ne!(home.id, a.id);
    }

    #[test]
    fn test_opposite_sides_are_occluded() {
        let a = at("a", 3.0, 0.0);
        let b = at("b", 3.0, PI);
        assert!(!a.can_see(&b, 1.0));
        assert!(!b.can_see(&a, 1.0));
    }

    #[test]
    fn test_same_side_is_visible() {
        let a = at("a", 3.0, 0.0);
        let b = at("b", 3.0, 0.3);
        assert!(a.can_see(&b, 1.0));
    }

    #[test]
    fn test_coincident_is_visible() {
        let a = at("a", 2.0, 1.0);
        let b = at("b", 2.0, 1.0);
        assert!(a.can_see(&b, 1.0));
    }

    #[test]
    fn test_advance_moves_bodies() {
        let mut orbit = OrbitalTopology::new(
            unit_planet(),
            vec![Body::satellite("s", 2.0, 0.0, 0.5, 1, 1)],
        );
        orbit.advance();
        orbit.advance();
        assert!((orbit.bodies[0].theta - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ground_station_rotates_with_planet() {
        let planet = Planet::new("P", 1.0, 0.25);
        let station = Body::ground_station("g", &planet, 0.0, 1, 1);
        assert_eq!(station.orbit_radius, 1.0);
        assert_eq!(station.angular_speed, 0.25);
    }

    #[test]
    fn test_earth_snapshot() {
        let mut earth = OrbitalTopology::earth_constellation();
        let topo = earth.snapshot().unwrap();

        assert_eq!(topo.nodes.len(), 8);
        assert_eq!(topo.visibility.len(), 8);
        for (i, row) in topo.visibility.iter().enumerate() {
            assert_eq!(row.len(), 8);
            assert!(!row[i]);
        }

        let office = earth.find_by_name("Office").unwrap();
        let node = topo.find_node(&office.id).unwrap();
        assert_eq!(node.ports, 6);
        assert_eq!(node.capacity, 7);

        // Home (theta 0) and Office (theta pi) are on opposite sides.
        let home = topo.nodes.iter().position(|n| n.name == "Home").unwrap();
        let office = topo.nodes.iter().position(|n| n.name == "Office").unwrap();
        assert!(!topo.visibility[home][office]);
    }

    #[test]
    fn test_invalid_planet_is_unavailable() {
        let mut orbit = OrbitalTopology::new(Planet::new("P", 0.0, 0.0), vec![]);
        assert!(matches!(orbit.snapshot(), Err(TopologyError::Unavailable(_))));
    }
}
