//! simulation tools for the swarmlink drone mesh

pub mod scenarios;

use std::time::Duration;
use swarmlink_radio::ChannelConfig;

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn calm_air() -> ChannelConfig {
        ChannelConfig {
            min_latency: Duration::from_millis(20),
            max_latency: Duration::from_millis(80),
            loss_probability: 0.01,
            seed: None,
        }
    }

    /// The link the drones were originally tuned for: 50-200 ms, 5% loss.
    pub fn default_link() -> ChannelConfig {
        ChannelConfig::default()
    }

    pub fn dust_storm() -> ChannelConfig {
        ChannelConfig {
            min_latency: Duration::from_millis(100),
            max_latency: Duration::from_millis(400),
            loss_probability: 0.20,
            seed: None,
        }
    }

    pub fn solar_flare() -> ChannelConfig {
        ChannelConfig {
            min_latency: Duration::from_millis(300),
            max_latency: Duration::from_millis(1200),
            loss_probability: 0.45,
            seed: None,
        }
    }

    pub fn all() -> Vec<(&'static str, ChannelConfig)> {
        vec![
            ("Calm Air", Self::calm_air()),
            ("Default Link", Self::default_link()),
            ("Dust Storm", Self::dust_storm()),
            ("Solar Flare", Self::solar_flare()),
        ]
    }
}
