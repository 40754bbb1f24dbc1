//! Topology setup and listener lifecycle for a set of nodes

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use log::{error, info, warn};
use swarmlink_core::NodeId;

use crate::channel::{Channel, ChannelStats};
use crate::node::{Node, Peer};
use crate::supervisor::DeliverySupervisor;
use crate::{ChannelConfig, MeshError, NodeConfig};

/// Collects node ids and links; nodes only come into existence in
/// [`NetworkBuilder::build`], fully wired.
pub struct NetworkBuilder {
    channel_config: ChannelConfig,
    node_config: NodeConfig,
    order: Vec<NodeId>,
    links: HashMap<NodeId, Vec<NodeId>>,
}

impl NetworkBuilder {
    pub fn new(channel_config: ChannelConfig) -> Self {
        Self {
            channel_config,
            node_config: NodeConfig::default(),
            order: Vec::new(),
            links: HashMap::new(),
        }
    }

    pub fn node_config(&mut self, config: NodeConfig) -> &mut Self {
        self.node_config = config;
        self
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>) -> Result<&mut Self, MeshError> {
        let id = id.into();
        if self.links.contains_key(&id) {
            return Err(MeshError::DuplicateNode(id));
        }
        self.links.insert(id.clone(), Vec::new());
        self.order.push(id);
        Ok(self)
    }

    /// Wire `a` and `b` as neighbors of each other. Linking an already
    /// linked pair changes nothing.
    pub fn link(&mut self, a: impl Into<NodeId>, b: impl Into<NodeId>) -> Result<&mut Self, MeshError> {
        let (a, b) = (a.into(), b.into());
        if a == b {
            return Err(MeshError::SelfLink(a));
        }
        for id in [&a, &b] {
            if !self.links.contains_key(id) {
                return Err(MeshError::UnknownNode(id.clone()));
            }
        }
        if self.links[&a].contains(&b) {
            return Ok(self);
        }
        if let Some(neighbors) = self.links.get_mut(&a) {
            neighbors.push(b.clone());
        }
        if let Some(neighbors) = self.links.get_mut(&b) {
            neighbors.push(a);
        }
        Ok(self)
    }

    /// Link every pair of nodes added so far.
    pub fn full_mesh(&mut self) -> Result<&mut Self, MeshError> {
        let ids = self.order.clone();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                self.link(a.clone(), b.clone())?;
            }
        }
        Ok(self)
    }

    pub fn build(&self) -> Result<Network, MeshError> {
        self.node_config.validate()?;
        let channel = Arc::new(Channel::new(self.channel_config.clone())?);
        let supervisor = Arc::new(DeliverySupervisor::new());

        let mut inboxes: HashMap<NodeId, _> = self
            .order
            .iter()
            .map(|id| (id.clone(), mpsc::unbounded_channel()))
            .collect();
        let peers: HashMap<NodeId, Peer> = inboxes
            .iter()
            .map(|(id, (tx, _))| (id.clone(), Peer::new(id.clone(), tx.clone())))
            .collect();

        let mut nodes = Vec::with_capacity(self.order.len());
        let mut index = HashMap::with_capacity(self.order.len());
        for id in &self.order {
            let inbox = inboxes
                .remove(id)
                .ok_or_else(|| MeshError::UnknownNode(id.clone()))?;
            let neighbors = self.links[id]
                .iter()
                .map(|n| peers.get(n).cloned().ok_or_else(|| MeshError::UnknownNode(n.clone())))
                .collect::<Result<Vec<_>, _>>()?;
            index.insert(id.clone(), nodes.len());
            nodes.push(Arc::new(Node::new(
                id.clone(),
                self.node_config.clone(),
                inbox,
                neighbors,
                channel.clone(),
                supervisor.clone(),
            )));
        }

        info!("Network built with {} nodes", nodes.len());
        Ok(Network {
            nodes,
            index,
            channel,
            supervisor,
            listeners: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }
}

pub struct Network {
    nodes: Vec<Arc<Node>>,
    index: HashMap<NodeId, usize>,
    channel: Arc<Channel>,
    supervisor: Arc<DeliverySupervisor>,
    listeners: Mutex<Vec<(NodeId, JoinHandle<Result<(), MeshError>>)>>,
    started: AtomicBool,
}

impl Network {
    pub fn builder(channel_config: ChannelConfig) -> NetworkBuilder {
        NetworkBuilder::new(channel_config)
    }

    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        self.index.get(&NodeId::from(id)).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Delivery attempts spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.supervisor.in_flight()
    }

    /// Spawn one listener task per node. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), MeshError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MeshError::AlreadyRunning);
        }
        let mut listeners = self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for node in &self.nodes {
            listeners.push((node.id().clone(), tokio::spawn(Arc::clone(node).listen())));
        }
        info!("Started {} listeners", listeners.len());
        Ok(())
    }

    pub fn stop(&self) {
        for node in &self.nodes {
            node.stop();
        }
    }

    /// Wait for every listener task to exit. Returns how many were joined.
    pub async fn join(&self) -> usize {
        let listeners = {
            let mut guard = self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        let joined = listeners.len();
        for (id, handle) in listeners {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Listener for {} exited with error: {}", id, e),
                Err(e) => error!("Listener for {} panicked: {}", id, e),
            }
        }
        joined
    }

    /// Stop every node, wait for the listeners, then wait for deliveries
    /// still in flight. Nothing spawned by this network outlives the call.
    pub async fn shutdown(&self) -> ChannelStats {
        self.stop();
        let joined = self.join().await;
        let drained = self.supervisor.drain().await;
        let stats = self.channel.stats();
        info!(
            "Network shut down: {} listeners joined, {} deliveries drained, stats {:?}",
            joined, drained, stats
        );
        stats
    }
}
