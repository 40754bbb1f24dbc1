//! Simulation scenarios for the drone and satellite mesh

use std::time::Duration;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use swarmlink_core::{MessageId, NodeId};
use swarmlink_radio::{ChannelConfig, ChannelStats, MeshError, Network, NetworkBuilder};

pub const SATELLITE: &str = "Satellite-1";

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub stats: ChannelStats,
    /// Messages each node's listener observed, in node order.
    pub observed: Vec<(NodeId, usize)>,
    /// Nodes other than the originator that observed the tracked alert.
    pub reached: usize,
}

impl ScenarioReport {
    fn collect(network: &Network, stats: ChannelStats, alert: &MessageId) -> Self {
        let observed = network
            .nodes()
            .iter()
            .map(|node| (node.id().clone(), node.received().len()))
            .collect();
        let reached = network
            .nodes()
            .iter()
            .filter(|node| node.id() != &alert.origin)
            .filter(|node| node.received().iter().any(|m| &m.id == alert))
            .count();
        Self { stats, observed, reached }
    }

    pub fn print(&self) {
        for (id, count) in &self.observed {
            println!("  {:<12} observed {} messages", id, count);
        }
        println!(
            "  channel: {} attempted, {} delivered, {} lost, {} failed",
            self.stats.attempted, self.stats.delivered, self.stats.dropped, self.stats.failed
        );
    }
}

/// Let the listeners run for `window`, showing progress.
async fn observe(window: Duration) {
    let tick = Duration::from_millis(100);
    let ticks = (window.as_millis() / tick.as_millis()).max(1) as u64;
    let bar = ProgressBar::new(ticks);
    bar.set_style(
        ProgressStyle::with_template("  observing {bar:30} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    for _ in 0..ticks {
        tokio::time::sleep(tick).await;
        bar.inc(1);
    }
    bar.finish_and_clear();
}

/// Two drones and the relay satellite, fully meshed: one routine reading,
/// one low-ozone alert relayed through the satellite, and a satellite-wide
/// deployment alert.
pub async fn drone_relay(config: ChannelConfig, window: Duration) -> Result<ScenarioReport, MeshError> {
    println!("\n=== Drone relay: Drone-1, Drone-2, {} ===", SATELLITE);

    let mut builder = NetworkBuilder::new(config);
    builder
        .add_node("Drone-1")?
        .add_node("Drone-2")?
        .add_node(SATELLITE)?
        .full_mesh()?;
    let network = builder.build()?;
    network.start()?;

    let (drone1, drone2, satellite) = match (
        network.node("Drone-1"),
        network.node("Drone-2"),
        network.node(SATELLITE),
    ) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => return Err(MeshError::UnknownNode(SATELLITE.into())),
    };

    drone1.send("Ozone level normal", drone2);
    let alert = drone2.send("Ozone level low - ALERT", satellite);
    satellite.broadcast("ALERT: Coordinated sprayer deployment needed");

    observe(window).await;
    let stats = network.shutdown().await;
    info!("Drone relay finished: {:?}", stats);
    Ok(ScenarioReport::collect(&network, stats, &alert))
}

/// `num_drones` drones in a ring with the satellite linked to every drone.
/// Drone-1 raises an alert and the flood is left to spread.
pub async fn swarm_flood(num_drones: usize, config: ChannelConfig, window: Duration) -> Result<ScenarioReport, MeshError> {
    println!("\n=== Swarm flood: {} drones + {} ===", num_drones, SATELLITE);

    let drones: Vec<String> = (1..=num_drones).map(|i| format!("Drone-{}", i)).collect();
    let mut builder = Network::builder(config);
    builder.add_node(SATELLITE)?;
    for drone in &drones {
        builder.add_node(drone.as_str())?.link(drone.as_str(), SATELLITE)?;
    }
    if drones.len() > 1 {
        for (i, drone) in drones.iter().enumerate() {
            let next = &drones[(i + 1) % drones.len()];
            builder.link(drone.as_str(), next.as_str())?;
        }
    }
    let network = builder.build()?;
    network.start()?;

    let origin = drones.first().map(String::as_str).unwrap_or(SATELLITE);
    let alert = match network.node(origin) {
        Some(node) => node.broadcast("Ozone level low - ALERT"),
        None => return Err(MeshError::UnknownNode(origin.into())),
    };

    observe(window).await;
    let stats = network.shutdown().await;
    info!("Swarm flood finished: {:?}", stats);
    let report = ScenarioReport::collect(&network, stats, &alert);
    println!("  alert from {} reached {}/{} nodes", origin, report.reached, network.nodes().len() - 1);
    Ok(report)
}
