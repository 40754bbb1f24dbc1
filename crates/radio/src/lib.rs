//! lossy radio mesh for the swarmlink drones and relay satellite

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use swarmlink_core::NodeId;

pub mod channel;
pub mod forwarding;
pub mod network;
pub mod node;
pub mod supervisor;

pub use channel::{Channel, ChannelStats, DeliveryOutcome};
pub use forwarding::{ForwardDecision, ForwardingPolicy, SeenCache, SuppressReason, PRIORITY_MARKER};
pub use network::{Network, NetworkBuilder};
pub use node::{Node, NodeState, Peer};
pub use supervisor::DeliverySupervisor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node {0} is already part of the network")]
    DuplicateNode(NodeId),

    #[error("Node {0} is not part of the network")]
    UnknownNode(NodeId),

    #[error("Node {0} cannot be its own neighbor")]
    SelfLink(NodeId),

    #[error("Node {0} is already listening")]
    AlreadyStarted(NodeId),

    #[error("Node {0} has been stopped")]
    Stopped(NodeId),

    #[error("Network listeners already started")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub loss_probability: f64,
    /// Fixed seed for reproducible latency and loss draws.
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(50),
            max_latency: Duration::from_millis(200),
            loss_probability: 0.05,
            seed: None,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.min_latency > self.max_latency {
            return Err(MeshError::InvalidConfig(format!(
                "min_latency {:?} exceeds max_latency {:?}",
                self.min_latency, self.max_latency
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(MeshError::InvalidConfig(format!(
                "loss_probability {} outside [0, 1]",
                self.loss_probability
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Upper bound on how long a listener waits before re-checking its state.
    pub poll_interval: Duration,
    pub priority_marker: String,
    /// How many recent message ids a node remembers; 0 disables duplicate suppression.
    pub seen_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            priority_marker: PRIORITY_MARKER.to_owned(),
            seen_capacity: 1024,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.poll_interval.is_zero() {
            return Err(MeshError::InvalidConfig("poll_interval must be non-zero".into()));
        }
        if self.priority_marker.is_empty() {
            return Err(MeshError::InvalidConfig("priority_marker must not be empty".into()));
        }
        Ok(())
    }
}
