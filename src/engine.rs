//! Relay engine: ties a topology source, the port graph and the relay
//! coordinator together and runs one relay pass per tick notification.
//!
//! All mutable state sits behind a single lock. A tick holds the lock for
//! its whole duration, so `send`, route queries and diagnostics always
//! observe a state between passes. Deliveries leave the lock through the
//! [`DeliveryDispatcher`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SimConfig;
use crate::coordinator::{RelayCoordinator, TickReport};
use crate::delivery::DeliveryDispatcher;
use crate::error::{RelayResult, TopologyError};
use crate::graph::Graph;
use crate::relay::{RelayState, SendRequest};
use crate::router::{RouteRequest, RouteResponse};
use crate::stats::RelayStats;
use crate::topology::{Topology, TopologySource};
use crate::types::PortId;

/// Longest pause between topology refresh attempts, in ticks.
const MAX_REFRESH_BACKOFF: u64 = 32;

/// One "advance the world" notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickNotice {
    pub seq: u64,
}

/// Exponential backoff counted in ticks.
#[derive(Clone, Debug)]
struct RefreshBackoff {
    skip: u64,
    delay: u64,
}

impl Default for RefreshBackoff {
    fn default() -> Self {
        Self { skip: 0, delay: 1 }
    }
}

impl RefreshBackoff {
    /// Returns true if this tick should attempt a refresh.
    fn ready(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            false
        } else {
            true
        }
    }

    /// Records a failure and returns the number of ticks to wait.
    fn fail(&mut self) -> u64 {
        self.skip = self.delay;
        self.delay = (self.delay * 2).min(MAX_REFRESH_BACKOFF);
        self.skip
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

struct EngineState {
    source: Box<dyn TopologySource>,
    topology: Topology,
    graph: Graph,
    coordinator: RelayCoordinator,
    backoff: RefreshBackoff,
    stats: RelayStats,
    timed: bool,
}

impl EngineState {
    /// Pulls a fresh snapshot unless backing off. On failure the last
    /// known-good graph stays in place.
    fn refresh(&mut self) {
        if !self.backoff.ready() {
            return;
        }

        let fresh = self
            .source
            .snapshot()
            .and_then(|topology| Graph::build(&topology).map(|graph| (topology, graph)));

        match fresh {
            Ok((topology, graph)) => {
                if topology.nodes != self.topology.nodes {
                    let discarded = self.coordinator.reconcile(&topology.nodes);
                    tracing::info!(
                        nodes = topology.nodes.len(),
                        discarded,
                        "node list changed"
                    );
                }
                self.topology = topology;
                self.graph = graph;
                self.backoff.reset();
            }
            Err(error) => {
                self.stats.topology_refresh_failures += 1;
                let wait = self.backoff.fail();
                tracing::warn!(
                    %error,
                    retry_in_ticks = wait,
                    "topology refresh failed, keeping last snapshot"
                );
            }
        }
    }
}

/// The top-level relay engine.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use satrelay::{
///     BaseNode, InlineDispatcher, MessageStore, RelayEngine, RetryPolicy, StaticTopology,
///     Topology,
/// };
///
/// let nodes = vec![
///     BaseNode::new("a", "A", 1, 5),
///     BaseNode::new("b", "B", 1, 3),
///     BaseNode::new("c", "C", 1, 5),
/// ];
/// let source = StaticTopology::new(Topology::from_links(nodes, &[("a", "b"), ("b", "c")]));
/// let store = Arc::new(MessageStore::new());
/// let dispatcher = Arc::new(InlineDispatcher::new(store.clone(), RetryPolicy::default()));
///
/// let engine = RelayEngine::new(Box::new(source), dispatcher).unwrap();
/// engine.send_message("a", "c", "hi").unwrap();
/// engine.step();
/// engine.step();
/// assert_eq!(store.len(), 1);
/// ```
pub struct RelayEngine {
    state: Mutex<EngineState>,
    dispatcher: Arc<dyn DeliveryDispatcher>,
}

impl RelayEngine {
    /// Creates an engine from the source's first snapshot.
    ///
    /// Fails if that snapshot cannot be obtained or is malformed.
    pub fn new(
        mut source: Box<dyn TopologySource>,
        dispatcher: Arc<dyn DeliveryDispatcher>,
    ) -> Result<Self, TopologyError> {
        let topology = source.snapshot()?;
        let graph = Graph::build(&topology)?;
        let coordinator = RelayCoordinator::from_nodes(&topology.nodes);

        tracing::info!(
            nodes = topology.nodes.len(),
            ports = graph.port_count(),
            edges = graph.edge_count(),
            "relay engine started"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                source,
                topology,
                graph,
                coordinator,
                backoff: RefreshBackoff::default(),
                stats: RelayStats::new(),
                timed: false,
            }),
            dispatcher,
        })
    }

    /// Creates an engine from a configuration: the `topology` section
    /// provides the source, `simulation.name` and `simulation.collect_stats`
    /// set up statistics.
    pub fn from_config(
        config: &SimConfig,
        dispatcher: Arc<dyn DeliveryDispatcher>,
    ) -> Result<Self, TopologyError> {
        let engine = Self::new(config.topology_source()?, dispatcher)?;
        Ok(engine.with_stats(&config.simulation.name, config.simulation.collect_stats))
    }

    /// Names the run and turns per-tick wall-time measurement on or off.
    pub fn with_stats(mut self, name: &str, timed: bool) -> Self {
        let state = self.state.get_mut();
        state.stats = std::mem::take(&mut state.stats).with_name(name);
        state.timed = timed;
        self
    }

    /// Runs one tick: advance the world, refresh the topology, then move
    /// every pending relay by at most one hop.
    pub fn step(&self) -> TickReport {
        let mut state = self.state.lock();
        let started = state.timed.then(Instant::now);

        state.source.advance();
        state.refresh();

        let EngineState {
            graph, coordinator, ..
        } = &mut *state;
        let report = coordinator.tick(graph, self.dispatcher.as_ref());

        if let Some(started) = started {
            state.stats.tick_wall_time_ms += started.elapsed().as_secs_f64() * 1000.0;
        }
        report
    }

    /// Runs `ticks` steps back to back.
    pub fn run_steps(&self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Runs one step per notice until the channel closes. Returns the
    /// number of steps taken.
    ///
    /// Expects a non-blocking dispatcher such as
    /// [`TokioDispatcher`](crate::TokioDispatcher); a blocking one is
    /// rejected and no step is taken.
    pub async fn run(&self, mut notices: mpsc::Receiver<TickNotice>) -> u64 {
        if self.dispatcher.blocks_caller() {
            tracing::error!("run needs a non-blocking delivery dispatcher, not starting");
            notices.close();
            return 0;
        }

        let mut steps = 0;
        while let Some(notice) = notices.recv().await {
            let report = self.step();
            if !report.is_idle() {
                tracing::debug!(
                    seq = notice.seq,
                    forwarded = report.forwarded.len(),
                    delivered = report.delivered.len(),
                    "tick"
                );
            }
            steps += 1;
        }
        tracing::info!(steps, "tick channel closed");
        steps
    }

    /// Starts a relay from `origin` to `destination` (base ids). Returns the
    /// armed origin port without waiting for delivery.
    pub fn send_message(
        &self,
        origin: &str,
        destination: &str,
        payload: impl Into<String>,
    ) -> RelayResult<PortId> {
        self.state
            .lock()
            .coordinator
            .send_message(origin, destination, payload)
    }

    /// Handles an originate command.
    pub fn send(&self, request: &SendRequest) -> RelayResult<()> {
        self.send_message(&request.origin, &request.destination, request.message.as_str())
            .map(|_| ())
    }

    /// Answers a route query in its string form against the current graph.
    pub fn route(&self, start: &str, end: &str, restricted: &str) -> RelayResult<RouteResponse> {
        let request = RouteRequest::parse(start, end, restricted)?;
        Ok(self.state.lock().graph.route(&request))
    }

    /// Returns the state of one port, if it exists.
    pub fn relay_state(&self, id: &PortId) -> Option<RelayState> {
        self.state.lock().coordinator.relay_state(id).cloned()
    }

    /// Ports currently holding an instruction.
    pub fn pending(&self) -> Vec<PortId> {
        self.state
            .lock()
            .coordinator
            .pending()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ports currently reserved.
    pub fn restrictions(&self) -> Vec<PortId> {
        self.state
            .lock()
            .coordinator
            .restrictions()
            .iter()
            .cloned()
            .collect()
    }

    /// The last known-good topology snapshot.
    pub fn topology(&self) -> Topology {
        self.state.lock().topology.clone()
    }

    /// Text dump of the current port graph.
    pub fn describe_graph(&self) -> String {
        self.state.lock().graph.describe()
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> RelayStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.absorb(state.coordinator.stats());
        stats.pending_relays = state.coordinator.pending().len();
        stats.port_count = state.graph.port_count();
        stats.edge_count = state.graph.edge_count();

        let counters = self.dispatcher.counters();
        stats.deliveries_stored = counters.delivered();
        stats.deliveries_dropped = counters.dropped();
        stats
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let stats = self.stats();
        serde_json::json!({
            "engine": {
                "name": stats.name,
                "ticks": stats.ticks,
                "pending_relays": stats.pending_relays,
                "ports": stats.port_count,
                "edges": stats.edge_count,
                "topology_refresh_failures": stats.topology_refresh_failures,
            },
            "relays": {
                "started": stats.relays_started,
                "hops_forwarded": stats.hops_forwarded,
                "stalled_relay_ticks": stats.stalled_relay_ticks,
                "send_failures": stats.send_failures,
                "discarded": stats.relays_discarded,
            },
            "delivery": {
                "dispatched": stats.deliveries_dispatched,
                "stored": stats.deliveries_stored,
                "dropped": stats.deliveries_dropped,
            },
        })
    }
}

/// Spawns a task that emits one [`TickNotice`] per `period`, stopping after
/// `limit` notices (if given) or when the receiver is dropped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_ticker(
    period: Duration,
    limit: Option<u64>,
) -> (mpsc::Receiver<TickNotice>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let period = period.max(Duration::from_millis(1));

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seq = 0;
        while limit.map_or(true, |limit| seq < limit) {
            interval.tick().await;
            if tx.send(TickNotice { seq }).await.is_err() {
                break;
            }
            seq += 1;
        }
    });

    (rx, handle)
}
