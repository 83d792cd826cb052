//! Connections and contact events

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::traits::SimTime;

/// A link between two nodes, owned by the external connectivity model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub a: NodeId,
    pub b: NodeId,
    pub up: bool,
}

impl Connection {
    /// Create a live connection
    pub fn up(a: NodeId, b: NodeId) -> Self {
        Self { a, b, up: true }
    }

    /// Create a torn-down connection
    pub fn down(a: NodeId, b: NodeId) -> Self {
        Self { a, b, up: false }
    }

    /// Whether the connection has `node` as an endpoint
    pub fn involves(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }

    /// The endpoint opposite `local`, if `local` is an endpoint
    pub fn other(&self, local: NodeId) -> Option<NodeId> {
        if self.a == local {
            Some(self.b)
        } else if self.b == local {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Two nodes connected or disconnected at a point in simulation time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub a: NodeId,
    pub b: NodeId,
    pub at: SimTime,
    pub up: bool,
}

impl ContactEvent {
    pub fn up(a: NodeId, b: NodeId, at: SimTime) -> Self {
        Self { a, b, at, up: true }
    }

    pub fn down(a: NodeId, b: NodeId, at: SimTime) -> Self {
        Self { a, b, at, up: false }
    }

    /// The connection state this event leaves behind
    pub fn connection(&self) -> Connection {
        Connection {
            a: self.a,
            b: self.b,
            up: self.up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_other() {
        let conn = Connection::up(NodeId(1), NodeId(2));
        assert_eq!(conn.other(NodeId(1)), Some(NodeId(2)));
        assert_eq!(conn.other(NodeId(2)), Some(NodeId(1)));
        assert_eq!(conn.other(NodeId(3)), None);
        assert!(conn.involves(NodeId(1)));
        assert!(!conn.involves(NodeId(3)));
    }

    #[test]
    fn test_contact_event_connection() {
        let event = ContactEvent::down(NodeId(0), NodeId(5), 30.0);
        let conn = event.connection();
        assert!(!conn.up);
        assert_eq!(conn.other(NodeId(5)), Some(NodeId(0)));
    }
}
