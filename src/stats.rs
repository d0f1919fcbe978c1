//! Statistics collection and export for relay simulations.
//!
//! [`RelayStats`] aggregates coordinator counters, delivery outcomes and
//! topology refresh health, and exports them as JSON, CSV or a
//! human-readable summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::coordinator::CoordinatorStats;
use crate::types::Tick;

/// Aggregate statistics for a relay run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Simulation name/description
    pub name: String,

    /// Ticks executed
    pub ticks: Tick,

    /// Relays armed through `send`
    pub relays_started: u64,

    /// Instructions moved to an intermediate port
    pub hops_forwarded: u64,

    /// Instructions that reached their objective
    pub deliveries_dispatched: u64,

    /// Deliveries the sink accepted
    pub deliveries_stored: u64,

    /// Deliveries dropped after retries
    pub deliveries_dropped: u64,

    /// Relay-ticks with no route
    pub stalled_relay_ticks: u64,

    /// Failed `send` calls
    pub send_failures: u64,

    /// In-flight instructions discarded by a delivery or a topology change
    pub relays_discarded: u64,

    /// Failed topology refreshes (last known-good snapshot was kept)
    pub topology_refresh_failures: u64,

    /// Relays still pending
    pub pending_relays: usize,

    /// Ports in the current snapshot
    pub port_count: usize,

    /// Undirected edges in the current snapshot
    pub edge_count: usize,

    /// Wall-clock time spent in relay passes, in milliseconds. Only
    /// measured when the engine collects detailed statistics.
    pub tick_wall_time_ms: f64,
}

impl RelayStats {
    /// Creates an empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Copies coordinator counters.
    pub fn absorb(&mut self, coordinator: &CoordinatorStats) {
        self.ticks = coordinator.ticks;
        self.relays_started = coordinator.relays_started;
        self.hops_forwarded = coordinator.hops_forwarded;
        self.deliveries_dispatched = coordinator.deliveries;
        self.stalled_relay_ticks = coordinator.stalled;
        self.send_failures = coordinator.send_failures;
        self.relays_discarded = coordinator.discarded;
    }

    /// Average wall-clock time per tick in milliseconds.
    pub fn mean_tick_ms(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.tick_wall_time_ms / self.ticks as f64
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports statistics to CSV as `metric,value` rows.
    pub fn to_csv(&self) -> String {
        let rows: [(&str, String); 14] = [
            ("ticks", self.ticks.to_string()),
            ("relays_started", self.relays_started.to_string()),
            ("hops_forwarded", self.hops_forwarded.to_string()),
            ("deliveries_dispatched", self.deliveries_dispatched.to_string()),
            ("deliveries_stored", self.deliveries_stored.to_string()),
            ("deliveries_dropped", self.deliveries_dropped.to_string()),
            ("stalled_relay_ticks", self.stalled_relay_ticks.to_string()),
            ("send_failures", self.send_failures.to_string()),
            ("relays_discarded", self.relays_discarded.to_string()),
            ("topology_refresh_failures", self.topology_refresh_failures.to_string()),
            ("pending_relays", self.pending_relays.to_string()),
            ("port_count", self.port_count.to_string()),
            ("edge_count", self.edge_count.to_string()),
            ("tick_wall_time_ms", format!("{:.2}", self.tick_wall_time_ms)),
        ];

        let mut csv = String::from("metric,value\n");
        for (metric, value) in rows {
            csv.push_str(&format!("{metric},{value}\n"));
        }
        csv
    }

    /// Exports statistics to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Relay Statistics ===")?;
        if !self.name.is_empty() {
            writeln!(w, "Name: {}", self.name)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Relays ---")?;
        writeln!(w, "Ticks: {}", self.ticks)?;
        writeln!(w, "Started: {}", self.relays_started)?;
        writeln!(w, "Hops forwarded: {}", self.hops_forwarded)?;
        writeln!(w, "Stalled relay-ticks: {}", self.stalled_relay_ticks)?;
        writeln!(w, "Still pending: {}", self.pending_relays)?;
        writeln!(w, "Send failures: {}", self.send_failures)?;
        writeln!(w, "Discarded: {}", self.relays_discarded)?;
        writeln!(w)?;

        writeln!(w, "--- Delivery ---")?;
        writeln!(w, "Dispatched: {}", self.deliveries_dispatched)?;
        writeln!(w, "Stored: {}", self.deliveries_stored)?;
        writeln!(w, "Dropped: {}", self.deliveries_dropped)?;
        writeln!(w)?;

        writeln!(w, "--- Topology ---")?;
        writeln!(w, "Ports: {}, Edges: {}", self.port_count, self.edge_count)?;
        writeln!(w, "Refresh failures: {}", self.topology_refresh_failures)?;
        writeln!(w, "Mean tick: {:.3} ms", self.mean_tick_ms())?;

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
