//! Buffered message metadata
//!
//! The forwarding engine never owns or mutates messages. It sees the
//! metadata it needs to rank forwarding candidates; the buffer manager
//! outside the engine owns the payload and its lifecycle.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::traits::SimTime;

/// Stable message identifier
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A message buffered at a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier
    pub id: MessageId,
    /// Originating node
    pub source: NodeId,
    /// Final recipient
    pub destination: NodeId,
    /// Payload size in bytes
    #[serde(default)]
    pub size: u64,
    /// Simulation time at which the current holder received it
    #[serde(default)]
    pub received_at: SimTime,
}

impl Message {
    pub fn new(id: impl Into<MessageId>, source: NodeId, destination: NodeId) -> Self {
        Self {
            id: id.into(),
            source,
            destination,
            size: 0,
            received_at: 0.0,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn received_at(mut self, at: SimTime) -> Self {
        self.received_at = at;
        self
    }

    /// Whether `node` is the final recipient
    pub fn is_for(&self, node: NodeId) -> bool {
        self.destination == node
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = Message::new("M1", NodeId(0), NodeId(3))
            .with_size(512)
            .received_at(12.5);
        assert_eq!(msg.id.as_str(), "M1");
        assert_eq!(msg.size, 512);
        assert_eq!(msg.received_at, 12.5);
        assert!(msg.is_for(NodeId(3)));
        assert!(!msg.is_for(NodeId(0)));
    }
}
