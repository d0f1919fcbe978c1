//! Orbital relay example.
//!
//! Sends messages between two ground stations of a rotating constellation
//! and relays them satellite by satellite, one hop per tick. A tokio task
//! emits tick notices at the configured interval; deliveries are retried in
//! the background and land in an in-memory message store.
//!
//! Run with the built-in Earth constellation:
//!
//! ```text
//! cargo run --example orbital_relay
//! ```
//!
//! or with a configuration file (YAML or JSON):
//!
//! ```text
//! cargo run --example orbital_relay -- relay.yaml
//! ```

use std::sync::Arc;

use satrelay::{
    init_logging, spawn_ticker, MessageStore, RelayEngine, SimConfig, SimConfigBuilder,
    TokioDispatcher,
};

const TICKS: u64 = 200;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfigBuilder::new()
            .name("earth constellation")
            .collect_stats(true)
            .earth()
            .build()?,
    };
    init_logging(&config.simulation.log_level);

    let store = Arc::new(MessageStore::new());
    let dispatcher = Arc::new(TokioDispatcher::current(store.clone(), config.retry_policy()));
    let engine = RelayEngine::from_config(&config, dispatcher.clone())?;

    let topology = engine.topology();
    println!("=== Topology ===");
    for node in &topology.nodes {
        println!("{:<10} {:<10} ports={} capacity={}", node.id, node.name, node.ports, node.capacity);
    }
    println!();

    // Ping-pong between the first and last node of the snapshot.
    if let (Some(first), Some(last)) = (topology.nodes.first(), topology.nodes.last()) {
        for (from, to, text) in [
            (first, last, format!("Hello {}", last.name)),
            (last, first, format!("Hello {}", first.name)),
        ] {
            match engine.send_message(&from.id, &to.id, text) {
                Ok(port) => println!("relay armed at {port}: {} -> {}", from.name, to.name),
                Err(e) => println!("send failed: {e}"),
            }
        }
    }

    let (ticks, ticker) = spawn_ticker(config.simulation.tick_interval(), Some(TICKS));
    let steps = engine.run(ticks).await;
    ticker.await?;
    dispatcher.flush().await;

    println!();
    println!("=== Delivered ({steps} ticks) ===");
    for message in store.list() {
        println!(
            "#{} {} -> {}: {}",
            message.id, message.sender_id, message.receiver_id, message.payload
        );
    }
    for port in engine.pending() {
        println!("still in flight at {port}");
    }

    println!();
    print!("{}", engine.stats().summary());

    Ok(())
}
