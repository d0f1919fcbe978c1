//! End-to-end relay scenarios driven through the coordinator.
//!
//! These tests cover:
//! - Hop-by-hop delivery along a line
//! - Detours around ports reserved by other relays
//! - Relays towards unreachable destinations
//! - Reservation bookkeeping under a random workload

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use satrelay::{
    BaseNode, DeliveryDispatcher, Graph, InlineDispatcher, MessageStore, OrbitalTopology, PortId,
    RelayCoordinator, RelayState, RetryPolicy, Topology, TopologySource,
};

// ============================================================================
// Helpers
// ============================================================================

fn setup(nodes: Vec<BaseNode>, links: &[(&str, &str)]) -> (Graph, RelayCoordinator) {
    let topology = Topology::from_links(nodes, links);
    let graph = Graph::build(&topology).unwrap();
    let coordinator = RelayCoordinator::from_nodes(&topology.nodes);
    (graph, coordinator)
}

fn dispatcher() -> (InlineDispatcher, Arc<MessageStore>) {
    let store = Arc::new(MessageStore::new());
    let dispatcher = InlineDispatcher::new(store.clone(), RetryPolicy::new(1, Duration::ZERO));
    (dispatcher, store)
}

fn p(base: &str) -> PortId {
    PortId::new(base, 1)
}

fn set(bases: &[&str]) -> BTreeSet<PortId> {
    bases.iter().map(|b| p(b)).collect()
}

fn assert_reservations_match_pending(coordinator: &RelayCoordinator) {
    let pending: BTreeSet<PortId> = coordinator.pending().into_iter().cloned().collect();
    assert_eq!(coordinator.restrictions(), &pending);
}

// ============================================================================
// Line: A - B - C
// ============================================================================

#[test]
fn test_line_delivery() {
    let (graph, mut coordinator) = setup(
        vec![
            BaseNode::new("A", "Alpha", 1, 5),
            BaseNode::new("B", "Bravo", 1, 3),
            BaseNode::new("C", "Charlie", 1, 5),
        ],
        &[("A", "B"), ("B", "C")],
    );
    let (dispatcher, store) = dispatcher();

    assert_eq!(coordinator.send_message("A", "C", "hi").unwrap(), p("A"));
    assert_eq!(coordinator.restrictions(), &set(&["A"]));

    let first = coordinator.tick(&graph, &dispatcher);
    assert_eq!(first.forwarded, vec![(p("A"), p("B"))]);
    assert_eq!(coordinator.relay_state(&p("A")), Some(&RelayState::Idle));
    assert!(coordinator.relay_state(&p("B")).unwrap().is_pending());
    assert_eq!(coordinator.restrictions(), &set(&["B"]));

    let second = coordinator.tick(&graph, &dispatcher);
    assert_eq!(second.delivered.len(), 1);
    let message = &store.list()[0];
    assert_eq!(message.sender_id, "A");
    assert_eq!(message.receiver_id, "C");
    assert_eq!(message.payload, "hi");

    for id in ["A", "B", "C"] {
        assert_eq!(coordinator.relay_state(&p(id)), Some(&RelayState::Idle));
    }
    assert!(coordinator.restrictions().is_empty());
    assert_eq!(dispatcher.counters().delivered(), 1);
}

// ============================================================================
// Diamond: A - {B, C} - D
// ============================================================================

fn diamond() -> (Graph, RelayCoordinator) {
    setup(
        vec![
            BaseNode::new("A", "Alpha", 1, 5),
            BaseNode::new("B", "Bravo", 1, 9),
            BaseNode::new("C", "Charlie", 1, 4),
            BaseNode::new("D", "Delta", 1, 5),
            BaseNode::new("E", "Echo", 1, 5),
        ],
        &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("B", "E")],
    )
}

#[test]
fn test_diamond_prefers_wider_branch() {
    let (graph, mut coordinator) = diamond();
    let (dispatcher, _) = dispatcher();

    coordinator.send_message("A", "D", "wide").unwrap();
    let report = coordinator.tick(&graph, &dispatcher);
    assert_eq!(report.forwarded, vec![(p("A"), p("B"))]);
}

#[test]
fn test_diamond_detours_around_reserved_port() {
    let (graph, mut coordinator) = diamond();
    let (dispatcher, store) = dispatcher();

    // B holds a relay of its own, so it is reserved for this tick.
    coordinator.send_message("A", "D", "detour").unwrap();
    coordinator.send_message("B", "E", "local").unwrap();
    assert_eq!(coordinator.restrictions(), &set(&["A", "B"]));

    let first = coordinator.tick(&graph, &dispatcher);
    assert_eq!(first.forwarded, vec![(p("A"), p("C"))]);
    assert_eq!(first.delivered.len(), 1);
    assert_eq!(store.list()[0].receiver_id, "E");
    assert_reservations_match_pending(&coordinator);

    let second = coordinator.tick(&graph, &dispatcher);
    assert_eq!(second.delivered.len(), 1);
    assert_eq!(store.for_receiver("D")[0].sender_id, "A");
    assert!(coordinator.pending().is_empty());
}

// ============================================================================
// Unreachable destination
// ============================================================================

#[test]
fn test_unreachable_stays_pending() {
    let (graph, mut coordinator) = setup(
        vec![
            BaseNode::new("A", "Alpha", 1, 5),
            BaseNode::new("B", "Bravo", 1, 5),
            BaseNode::new("Z", "Island", 1, 5),
        ],
        &[("A", "B")],
    );
    let (dispatcher, store) = dispatcher();

    coordinator.send_message("A", "Z", "lost").unwrap();
    for _ in 0..25 {
        let report = coordinator.tick(&graph, &dispatcher);
        assert!(report.is_idle());
        assert_eq!(report.stalled, vec![p("A")]);
    }

    assert!(coordinator.relay_state(&p("A")).unwrap().is_pending());
    assert_eq!(coordinator.restrictions(), &set(&["A"]));
    assert_eq!(coordinator.stats().stalled, 25);
    assert!(store.is_empty());

    // The origin port stays claimed.
    assert!(coordinator.send_message("A", "B", "again").is_err());
}

#[test]
fn test_second_port_usable_while_first_is_stuck() {
    let (graph, mut coordinator) = setup(
        vec![
            BaseNode::new("A", "Alpha", 1, 5),
            BaseNode::new("B", "Bravo", 2, 5),
            BaseNode::new("Z", "Island", 1, 5),
        ],
        &[("A", "B")],
    );
    let (dispatcher, store) = dispatcher();

    // B's first port is stuck on a relay to Z; A addresses the second one.
    assert_eq!(coordinator.send_message("B", "Z", "stuck").unwrap(), p("B"));
    assert_eq!(coordinator.send_message("A", "B", "hello").unwrap(), p("A"));

    let report = coordinator.tick(&graph, &dispatcher);
    assert_eq!(report.stalled, vec![p("B")]);
    assert_eq!(store.for_receiver("B").len(), 1);
    assert!(coordinator.relay_state(&p("B")).unwrap().is_pending());
    assert_eq!(
        coordinator.relay_state(&PortId::new("B", 2)),
        Some(&RelayState::Idle)
    );
    assert_reservations_match_pending(&coordinator);
}

// ============================================================================
// Random workload
// ============================================================================

struct XorShift(u64);

impl XorShift {
    fn below(&mut self, n: u64) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x % n
    }
}

#[test]
fn test_reservations_under_random_workload() {
    let mut earth = OrbitalTopology::earth_constellation();
    let ids: Vec<String> = earth.bodies.iter().map(|b| b.id.clone()).collect();
    let mut coordinator = RelayCoordinator::from_nodes(&earth.snapshot().unwrap().nodes);
    let (dispatcher, store) = dispatcher();
    let mut rng = XorShift(0x5EED);

    for _ in 0..400 {
        earth.advance();
        let graph = Graph::build(&earth.snapshot().unwrap()).unwrap();

        if rng.below(3) == 0 {
            let from = &ids[rng.below(ids.len() as u64) as usize];
            let to = &ids[rng.below(ids.len() as u64) as usize];
            let _ = coordinator.send_message(from, to, "ping");
        }

        let report = coordinator.tick(&graph, &dispatcher);
        for (from, to) in &report.forwarded {
            assert!(graph.is_adjacent(from, to));
        }
        assert_reservations_match_pending(&coordinator);

        let stats = coordinator.stats();
        assert_eq!(
            stats.relays_started,
            stats.deliveries + stats.discarded + coordinator.pending().len() as u64
        );
    }

    assert_eq!(store.len() as u64, coordinator.stats().deliveries);
}
