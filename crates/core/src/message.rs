use serde::{Deserialize, Serialize};

use crate::types::{MessageId, NodeId};

/// A message in flight between two neighbors.
///
/// `sender` is the node that transmitted this hop, which differs from
/// `id.origin` once the message has been forwarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: MessageId,
    pub sender: NodeId,
    pub payload: String,
}

impl Envelope {
    pub fn new(id: MessageId, payload: impl Into<String>) -> Self {
        Self {
            sender: id.origin.clone(),
            id,
            payload: payload.into(),
        }
    }

    /// Copy of this message re-sent by `via`, keeping the original id.
    pub fn relayed_by(&self, via: &NodeId) -> Self {
        Self {
            id: self.id.clone(),
            sender: via.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// What a node's listener observed when it dequeued a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub sender: NodeId,
    pub payload: String,
    pub id: MessageId,
}

impl From<Envelope> for ReceivedMessage {
    fn from(envelope: Envelope) -> Self {
        Self {
            sender: envelope.sender,
            payload: envelope.payload,
            id: envelope.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_keeps_origin() {
        let original = Envelope::new(MessageId::new("Drone-2".into(), 0), "Ozone level low - ALERT");
        assert_eq!(original.sender, "Drone-2");

        let hop = original.relayed_by(&"Satellite-1".into());
        assert_eq!(hop.sender, "Satellite-1");
        assert_eq!(hop.id.origin, "Drone-2");
        assert_eq!(hop.payload, original.payload);
    }
}
