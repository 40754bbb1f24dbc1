//! drone mesh simulation for swarmlink

use std::time::Duration;
use anyhow::Result;
use colored::Colorize;
use swarmlink_sim::{SimulationPresets, scenarios};

const OBSERVATION_WINDOW: Duration = Duration::from_secs(3);
const SWARM_SIZE: usize = 6;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "Swarmlink Drone Mesh Simulation".bright_blue().bold());
    println!("{}", "===============================".bright_blue());

    for (name, config) in SimulationPresets::all() {
        println!("{}", format!("\n>>> Testing: {}", name).bright_green().bold());
        println!("Latency: {:?} - {:?}", config.min_latency, config.max_latency);
        println!("Packet Loss: {}%", (config.loss_probability * 100.0) as u32);

        let relay = scenarios::drone_relay(config.clone(), OBSERVATION_WINDOW).await?;
        relay.print();

        let flood = scenarios::swarm_flood(SWARM_SIZE, config, OBSERVATION_WINDOW).await?;
        flood.print();
        if flood.reached < SWARM_SIZE {
            println!("{}", format!("  alert missed {} nodes", SWARM_SIZE - flood.reached).yellow());
        }

        println!("{}", "-".repeat(50));
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
