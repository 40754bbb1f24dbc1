//! A drone or satellite on the mesh: identity, neighbors, inbox and listener

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::{Mutex, mpsc};
use log::{debug, info, trace, warn};
use swarmlink_core::{Envelope, MessageId, NodeId, ReceivedMessage};

use crate::channel::Channel;
use crate::forwarding::{forward_targets, is_priority, ForwardDecision, ForwardingPolicy};
use crate::supervisor::DeliverySupervisor;
use crate::{MeshError, NodeConfig};

/// Lifecycle of a node's listener. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    Created = 0,
    Listening = 1,
    Stopping = 2,
    Stopped = 3,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeState::Created,
            1 => NodeState::Listening,
            2 => NodeState::Stopping,
            _ => NodeState::Stopped,
        }
    }
}

/// Handle to another node's inbox. Holding one does not keep that node
/// alive; once it is gone deliveries to it fail.
#[derive(Debug, Clone)]
pub struct Peer {
    id: NodeId,
    inbox: mpsc::UnboundedSender<Envelope>,
}

impl Peer {
    pub(crate) fn new(id: NodeId, inbox: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { id, inbox }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Append to the peer's inbox; hands the envelope back if it is closed.
    pub(crate) fn deliver(&self, envelope: Envelope) -> Result<(), Envelope> {
        self.inbox.send(envelope).map_err(|e| e.0)
    }
}

pub struct Node {
    id: NodeId,
    config: NodeConfig,
    neighbors: Vec<Peer>,
    address: Peer,
    inbox: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    state: AtomicU8,
    next_seq: AtomicU64,
    policy: ForwardingPolicy,
    received: std::sync::Mutex<Vec<ReceivedMessage>>,
    channel: Arc<Channel>,
    supervisor: Arc<DeliverySupervisor>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        config: NodeConfig,
        inbox: (mpsc::UnboundedSender<Envelope>, mpsc::UnboundedReceiver<Envelope>),
        neighbors: Vec<Peer>,
        channel: Arc<Channel>,
        supervisor: Arc<DeliverySupervisor>,
    ) -> Self {
        let (tx, rx) = inbox;
        let policy = ForwardingPolicy::new(config.priority_marker.clone(), config.seen_capacity);
        Self {
            address: Peer::new(id.clone(), tx),
            id,
            config,
            neighbors,
            inbox: Mutex::new(rx),
            state: AtomicU8::new(NodeState::Created as u8),
            next_seq: AtomicU64::new(0),
            policy,
            received: std::sync::Mutex::new(Vec::new()),
            channel,
            supervisor,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &NodeId> {
        self.neighbors.iter().map(Peer::id)
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Handle other nodes use to reach this one.
    pub fn peer(&self) -> Peer {
        self.address.clone()
    }

    /// Send `payload` to `target` as a new message. Returns immediately; the
    /// outcome is only visible through logs and stats.
    pub fn send(&self, payload: impl Into<String>, target: &Node) -> MessageId {
        let payload = payload.into();
        let id = self.originate(&payload);
        let envelope = Envelope::new(id.clone(), payload);
        self.transmit(envelope, target.peer());
        id
    }

    /// Send `payload` to every neighbor, each as an independent attempt.
    pub fn broadcast(&self, payload: impl Into<String>) -> MessageId {
        let payload = payload.into();
        let id = self.originate(&payload);
        let envelope = Envelope::new(id.clone(), payload);
        for peer in &self.neighbors {
            self.transmit(envelope.clone(), peer.clone());
        }
        id
    }

    /// Only priority ids go into the seen set; routine traffic would
    /// otherwise push this node's own alerts out of it.
    fn originate(&self, payload: &str) -> MessageId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = MessageId::new(self.id.clone(), seq);
        if is_priority(payload, self.policy.marker()) {
            self.policy.mark_originated(&id);
        }
        id
    }

    fn transmit(&self, envelope: Envelope, target: Peer) {
        trace!("{} → {}: sending {}", envelope.sender, target.id(), envelope.id);
        let channel = Arc::clone(&self.channel);
        self.supervisor.spawn(async move {
            channel.attempt_delivery(envelope, &target).await;
        });
    }

    /// Run the listener until [`Node::stop`] is observed. Each wait on the
    /// inbox is bounded by the configured poll interval.
    pub async fn listen(self: Arc<Self>) -> Result<(), MeshError> {
        if let Err(actual) = self.state.compare_exchange(
            NodeState::Created as u8,
            NodeState::Listening as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(match NodeState::from_u8(actual) {
                NodeState::Listening => MeshError::AlreadyStarted(self.id.clone()),
                _ => MeshError::Stopped(self.id.clone()),
            });
        }
        info!("{} listening", self.id);

        while self.state() == NodeState::Listening {
            let next = {
                let mut inbox = self.inbox.lock().await;
                tokio::time::timeout(self.config.poll_interval, inbox.recv()).await
            };
            match next {
                Ok(Some(envelope)) => self.handle(envelope),
                Ok(None) => {
                    warn!("{} inbox closed, listener exiting", self.id);
                    break;
                }
                Err(_) => continue,
            }
        }

        self.state.store(NodeState::Stopped as u8, Ordering::SeqCst);
        info!("{} stopped", self.id);
        Ok(())
    }

    fn handle(&self, envelope: Envelope) {
        info!("{} received from {}: {}", self.id, envelope.sender, envelope.payload);
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(ReceivedMessage::from(envelope.clone()));

        match self.policy.decide(&envelope) {
            ForwardDecision::Flood { exclude } => {
                let relay = envelope.relayed_by(&self.id);
                let mut forwarded = 0;
                for peer in forward_targets(&self.neighbors, &exclude) {
                    self.transmit(relay.clone(), peer.clone());
                    forwarded += 1;
                }
                debug!("{} forwarding {} to {} neighbors", self.id, envelope.id, forwarded);
            }
            ForwardDecision::Suppress(reason) => {
                debug!("{} not forwarding {}: {:?}", self.id, envelope.id, reason);
            }
            ForwardDecision::Ignore => {}
        }
    }

    /// Ask the listener to exit. It notices within one poll interval; a
    /// node that never started goes straight to `Stopped`.
    pub fn stop(&self) {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let next = match NodeState::from_u8(current) {
                NodeState::Created => NodeState::Stopped,
                NodeState::Listening => NodeState::Stopping,
                NodeState::Stopping | NodeState::Stopped => return,
            };
            match self.state.compare_exchange(current, next as u8, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    debug!("{} {:?} -> {:?}", self.id, NodeState::from_u8(current), next);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Messages the listener has dequeued, oldest first. The history is kept
    /// for the node's whole lifetime and is not capped.
    pub fn received(&self) -> Vec<ReceivedMessage> {
        self.received.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Entries still waiting in the inbox. Waits for the listener's current
    /// poll to finish if one is in progress.
    pub async fn pending(&self) -> usize {
        self.inbox.lock().await.len()
    }
}
