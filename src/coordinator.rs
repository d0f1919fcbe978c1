//! Relay coordinator: the per-tick store-and-forward state machine.
//!
//! Every port is either idle or holds one instruction waiting for its next
//! hop. Each [`tick`](RelayCoordinator::tick) moves every waiting
//! instruction forward by at most one hop:
//!
//! ```text
//! Idle --(send / arrival)--> RelayPending --(hand-off / delivered)--> Idle
//! ```
//!
//! The restriction set holds ports that are reserved by an in-flight relay.
//! Reserved ports are never chosen as intermediate hops, which keeps two
//! relays from landing on the same port in the same tick.

use std::collections::{BTreeMap, BTreeSet};

use crate::delivery::DeliveryDispatcher;
use crate::error::{RelayError, RelayResult};
use crate::graph::Graph;
use crate::node::BaseNode;
use crate::relay::{Delivery, Instruction, RelayState};
use crate::types::PortId;

/// Counters kept by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Ticks processed
    pub ticks: u64,
    /// Relays armed by `send_message`
    pub relays_started: u64,
    /// Hops that moved an instruction to an intermediate port
    pub hops_forwarded: u64,
    /// Instructions that reached their objective
    pub deliveries: u64,
    /// Pending relays that found no route in a tick
    pub stalled: u64,
    /// `send_message` calls that failed
    pub send_failures: u64,
    /// Instructions lost to a delivery landing on their port, or to a
    /// topology change
    pub discarded: u64,
}

/// What happened during one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `(from, to)` pairs for instructions moved to an intermediate port
    pub forwarded: Vec<(PortId, PortId)>,
    /// Deliveries handed to the dispatcher
    pub delivered: Vec<Delivery>,
    /// Ports whose instruction made no progress
    pub stalled: Vec<PortId>,
}

impl TickReport {
    /// Returns true if no relay moved.
    pub fn is_idle(&self) -> bool {
        self.forwarded.is_empty() && self.delivered.is_empty()
    }
}

/// Owns per-port relay state and the restriction set.
#[derive(Clone, Debug, Default)]
pub struct RelayCoordinator {
    ports: BTreeMap<PortId, RelayState>,
    restrictions: BTreeSet<PortId>,
    stats: CoordinatorStats,
}

impl RelayCoordinator {
    /// Creates a coordinator with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coordinator with one idle slot per port of `nodes`.
    pub fn from_nodes(nodes: &[BaseNode]) -> Self {
        let mut coordinator = Self::new();
        coordinator.reconcile(nodes);
        coordinator
    }

    /// Aligns the port table with a new node list.
    ///
    /// Ports that still exist keep their state. New ports start idle.
    /// Ports that vanished are removed together with any instruction they
    /// held, as are instructions whose objective vanished. Returns the
    /// number of discarded instructions.
    pub fn reconcile(&mut self, nodes: &[BaseNode]) -> usize {
        let wanted: BTreeSet<PortId> = nodes
            .iter()
            .flat_map(|node| node.expand().map(|port| port.id))
            .collect();

        let mut discarded = 0;
        self.ports.retain(|id, state| {
            let keep_port = wanted.contains(id);
            let orphaned = state
                .instruction()
                .is_some_and(|i| !keep_port || !wanted.contains(&i.objective));
            if orphaned {
                tracing::warn!(port = %id, "discarding in-flight instruction after topology change");
                discarded += 1;
                state.take();
            }
            keep_port
        });
        for id in wanted {
            self.ports.entry(id).or_default();
        }
        self.restrictions.retain(|id| {
            self.ports.get(id).is_some_and(RelayState::is_pending)
        });

        self.stats.discarded += discarded as u64;
        discarded
    }

    /// Starts a relay from `origin` to `destination` (base ids).
    ///
    /// Claims the lowest-numbered free port on each side; a port is free when
    /// it is neither reserved nor holding an instruction. An origin port must
    /// also not be the objective of a relay in flight. The origin port is
    /// armed and reserved. Returns the armed origin port.
    pub fn send_message(
        &mut self,
        origin: &str,
        destination: &str,
        payload: impl Into<String>,
    ) -> RelayResult<PortId> {
        let payload = payload.into();
        if origin.is_empty() || destination.is_empty() || payload.is_empty() {
            self.stats.send_failures += 1;
            return Err(RelayError::MalformedRequest(
                "missing origin, destination, or message".to_string(),
            ));
        }
        if origin == destination {
            self.stats.send_failures += 1;
            return Err(RelayError::MalformedRequest(format!(
                "origin and destination are the same node: {origin}"
            )));
        }

        let from = self.free_port(origin, |id| !self.is_objective(id));
        let to = self.free_port(destination, |_| true);
        let (Some(from), Some(to)) = (from, to) else {
            tracing::warn!(%origin, %destination, "could not find free ports");
            self.stats.send_failures += 1;
            return Err(RelayError::PortExhausted {
                origin: origin.to_string(),
                destination: destination.to_string(),
            });
        };

        tracing::debug!(%from, %to, "relay armed");
        let instruction = Instruction::new(from.clone(), to, payload);
        self.ports
            .insert(from.clone(), RelayState::RelayPending(instruction));
        self.restrictions.insert(from.clone());
        self.stats.relays_started += 1;
        Ok(from)
    }

    /// Advances every relay that was pending when the tick started by at
    /// most one hop, using `graph` as the topology for the whole pass.
    ///
    /// Ports are visited in ascending id order. A port that receives an
    /// instruction during this pass is not visited again until the next
    /// tick. A relay with no route stays pending. The objective of a
    /// delivered relay is left idle and unreserved; an instruction it was
    /// holding is discarded.
    pub fn tick(&mut self, graph: &Graph, dispatcher: &dyn DeliveryDispatcher) -> TickReport {
        let mut report = TickReport::default();
        let pending: Vec<PortId> = self
            .ports
            .iter()
            .filter(|(_, state)| state.is_pending())
            .map(|(id, _)| id.clone())
            .collect();

        for origin in pending {
            let Some(instruction) = self.ports.get(&origin).and_then(RelayState::instruction).cloned()
            else {
                continue;
            };

            match self.next_hop(graph, &origin, &instruction) {
                Some(hop) if hop == instruction.objective => {
                    let delivery = Delivery {
                        sender: instruction.origin.base().to_string(),
                        receiver: hop.base().to_string(),
                        payload: instruction.payload,
                    };
                    tracing::debug!(from = %origin, to = %hop, "final hop");
                    if let Some(lost) = self.ports.get_mut(&hop).and_then(RelayState::take) {
                        tracing::warn!(
                            port = %hop,
                            objective = %lost.objective,
                            "delivery landed on a busy port, discarding its instruction"
                        );
                        self.stats.discarded += 1;
                    }
                    self.restrictions.remove(&hop);
                    dispatcher.dispatch(delivery.clone());
                    report.delivered.push(delivery);
                    self.stats.deliveries += 1;
                }
                Some(hop) => {
                    tracing::debug!(from = %origin, to = %hop, "forwarding");
                    self.restrictions.insert(hop.clone());
                    self.ports
                        .insert(hop.clone(), RelayState::RelayPending(instruction));
                    report.forwarded.push((origin.clone(), hop));
                    self.stats.hops_forwarded += 1;
                }
                None => {
                    report.stalled.push(origin);
                    self.stats.stalled += 1;
                    continue;
                }
            }

            self.restrictions.remove(&origin);
            if let Some(state) = self.ports.get_mut(&origin) {
                *state = RelayState::Idle;
            }
        }

        self.stats.ticks += 1;
        report
    }

    /// Chooses the next hop for `origin`, or `None` if the relay cannot move
    /// this tick.
    fn next_hop(&self, graph: &Graph, origin: &PortId, instruction: &Instruction) -> Option<PortId> {
        let mut excluded = self.restrictions.clone();
        excluded.remove(origin);
        excluded.remove(&instruction.objective);

        let path = graph.widest_path(origin, &instruction.objective, &excluded)?;
        let hop = path.get(1)?.clone();

        match self.ports.get(&hop) {
            None => {
                tracing::warn!(%hop, "route leads to a port unknown to the coordinator");
                None
            }
            // The objective may be busy with a relay of its own; delivery
            // clears it.
            Some(state) if state.is_pending() && hop != instruction.objective => {
                tracing::warn!(%hop, "route leads to a busy port");
                None
            }
            Some(_) => Some(hop),
        }
    }

    /// First free port of `base` accepted by `eligible`, lowest port index
    /// first.
    fn free_port(&self, base: &str, eligible: impl Fn(&PortId) -> bool) -> Option<PortId> {
        self.ports
            .iter()
            .filter(|(id, _)| id.base() == base)
            .find(|(id, state)| {
                state.is_idle() && !self.restrictions.contains(*id) && eligible(id)
            })
            .map(|(id, _)| id.clone())
    }

    fn is_objective(&self, id: &PortId) -> bool {
        self.ports
            .values()
            .filter_map(RelayState::instruction)
            .any(|instruction| &instruction.objective == id)
    }

    /// Returns the relay state of a port.
    pub fn relay_state(&self, id: &PortId) -> Option<&RelayState> {
        self.ports.get(id)
    }

    /// Ports currently holding an instruction, in ascending order.
    pub fn pending(&self) -> Vec<&PortId> {
        self.ports
            .iter()
            .filter(|(_, state)| state.is_pending())
            .map(|(id, _)| id)
            .collect()
    }

    /// Ports currently reserved by in-flight relays.
    pub fn restrictions(&self) -> &BTreeSet<PortId> {
        &self.restrictions
    }

    /// Number of port slots.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Returns the coordinator counters.
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }
}
