//! Flood forwarding of priority messages
//!
//! A received message whose payload carries the priority marker is
//! re-broadcast to every neighbor except the node that handed it over. On its
//! own that rule loops forever around any cycle in the topology, so each node
//! also remembers the ids of messages it has already originated or forwarded
//! and suppresses repeats.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use swarmlink_core::{Envelope, MessageId, NodeId};

use crate::node::Peer;

pub const PRIORITY_MARKER: &str = "ALERT";

/// Case-sensitive substring test.
pub fn is_priority(payload: &str, marker: &str) -> bool {
    payload.contains(marker)
}

/// Every neighbor except exactly `exclude`, in wiring order.
pub fn forward_targets<'a>(neighbors: &'a [Peer], exclude: &'a NodeId) -> impl Iterator<Item = &'a Peer> + 'a {
    neighbors.iter().filter(move |peer| peer.id() != exclude)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Already originated or forwarded by this node
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    /// Re-broadcast to all neighbors but `exclude`
    Flood { exclude: NodeId },
    /// Not a priority message
    Ignore,
    Suppress(SuppressReason),
}

impl ForwardDecision {
    pub fn is_forwarding(&self) -> bool {
        matches!(self, ForwardDecision::Flood { .. })
    }
}

/// Bounded set of recently seen message ids; the oldest id is evicted first.
#[derive(Debug)]
pub struct SeenCache {
    capacity: usize,
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            ids: HashSet::new(),
        }
    }

    /// Returns `true` if `id` was not present. A zero-capacity cache
    /// remembers nothing and always returns `true`.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct ForwardingPolicy {
    marker: String,
    seen: Mutex<SeenCache>,
}

impl ForwardingPolicy {
    pub fn new(marker: impl Into<String>, seen_capacity: usize) -> Self {
        Self {
            marker: marker.into(),
            seen: Mutex::new(SeenCache::new(seen_capacity)),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Record a message this node originates, so an echo of it is not
    /// flooded a second time.
    pub fn mark_originated(&self, id: &MessageId) {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).insert(id.clone());
    }

    pub fn decide(&self, envelope: &Envelope) -> ForwardDecision {
        if !is_priority(&envelope.payload, &self.marker) {
            return ForwardDecision::Ignore;
        }
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(envelope.id.clone());
        if fresh {
            ForwardDecision::Flood { exclude: envelope.sender.clone() }
        } else {
            ForwardDecision::Suppress(SuppressReason::Duplicate)
        }
    }
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self::new(PRIORITY_MARKER, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn envelope(origin: &str, seq: u64, sender: &str, payload: &str) -> Envelope {
        Envelope::new(MessageId::new(origin.into(), seq), payload).relayed_by(&sender.into())
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        assert!(is_priority("Ozone level low - ALERT", PRIORITY_MARKER));
        assert!(is_priority("ALERT: Coordinated sprayer deployment needed", PRIORITY_MARKER));
        assert!(!is_priority("alert: lowercase", PRIORITY_MARKER));
        assert!(!is_priority("Ozone level normal", PRIORITY_MARKER));
    }

    #[test]
    fn test_priority_floods_excluding_immediate_sender() {
        let policy = ForwardingPolicy::default();
        assert_eq!(policy.marker(), PRIORITY_MARKER);
        let msg = envelope("Drone-2", 0, "Satellite-1", "Ozone level low - ALERT");
        assert_eq!(policy.decide(&msg), ForwardDecision::Flood { exclude: "Satellite-1".into() });
    }

    #[test]
    fn test_plain_payload_is_ignored() {
        let policy = ForwardingPolicy::default();
        let msg = envelope("Drone-1", 0, "Drone-1", "status:normal");
        assert_eq!(policy.decide(&msg), ForwardDecision::Ignore);
        assert!(!policy.decide(&msg).is_forwarding());
    }

    #[test]
    fn test_duplicate_is_suppressed() {
        let policy = ForwardingPolicy::default();
        let first = envelope("Drone-1", 3, "Drone-1", "ALERT");
        let echo = envelope("Drone-1", 3, "Drone-2", "ALERT");

        assert!(policy.decide(&first).is_forwarding());
        assert_eq!(policy.decide(&echo), ForwardDecision::Suppress(SuppressReason::Duplicate));
    }

    #[test]
    fn test_originated_message_is_not_reflooded() {
        let policy = ForwardingPolicy::default();
        let id = MessageId::new("Satellite-1".into(), 0);
        policy.mark_originated(&id);

        let echo = Envelope::new(id, "ALERT").relayed_by(&"Drone-1".into());
        assert!(!policy.decide(&echo).is_forwarding());
    }

    #[test]
    fn test_zero_capacity_never_suppresses() {
        let policy = ForwardingPolicy::new(PRIORITY_MARKER, 0);
        let msg = envelope("Drone-1", 0, "Drone-2", "ALERT");
        for _ in 0..3 {
            assert!(policy.decide(&msg).is_forwarding());
        }
    }

    #[test]
    fn test_seen_cache_evicts_oldest() {
        let mut cache = SeenCache::new(2);
        assert!(cache.is_empty());
        let ids: Vec<_> = (0..3).map(|seq| MessageId::new("Drone-1".into(), seq)).collect();

        assert!(cache.insert(ids[0].clone()));
        assert!(cache.insert(ids[1].clone()));
        assert!(!cache.insert(ids[1].clone()));
        assert!(cache.insert(ids[2].clone()));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&ids[0]));
        assert!(cache.contains(&ids[2]));
    }

    #[test]
    fn test_forward_targets_skip_only_sender() {
        let peers: Vec<Peer> = ["Drone-1", "Drone-2", "Satellite-1"]
            .into_iter()
            .map(|id| {
                let (tx, _rx) = mpsc::unbounded_channel();
                Peer::new(id.into(), tx)
            })
            .collect();

        let exclude = NodeId::from("Drone-2");
        let targets: Vec<_> = forward_targets(&peers, &exclude).map(|p| p.id().to_string()).collect();
        assert_eq!(targets, vec!["Drone-1", "Satellite-1"]);
    }
}
