//! Forwarding candidates and queue ordering

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::event::Connection;
use crate::identity::NodeId;
use crate::message::Message;

/// A proposal to offer `message` over `connection` to `peer`
///
/// Produced fresh on every tick and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub message: Message,
    pub connection: Connection,
    /// The neighbour on the far side of `connection`
    pub peer: NodeId,
    /// Strategy-specific score; only comparable within one strategy
    pub utility: f64,
}

impl Candidate {
    pub fn new(message: Message, connection: Connection, peer: NodeId, utility: f64) -> Self {
        Self {
            message,
            connection,
            peer,
            utility,
        }
    }

    /// Whether this candidate hands the message to its final recipient
    pub fn is_direct_delivery(&self) -> bool {
        self.message.destination == self.peer
    }
}

/// Result of a single transfer attempt, reported back by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    /// The transfer was started or completed
    Accepted,
    /// The transfer was not attempted or failed
    Rejected,
}

impl TransferOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TransferOutcome::Accepted)
    }
}

/// Buffer queue discipline used to break ranking ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Oldest received message first
    #[default]
    Fifo,
    /// Newest received message first
    Lifo,
}

impl QueueMode {
    /// Total order over messages for this queue mode
    ///
    /// Equal receive times fall back to message id so the order is the
    /// same on every run.
    pub fn compare(&self, a: &Message, b: &Message) -> Ordering {
        let by_time = a.received_at.total_cmp(&b.received_at);
        let by_time = match self {
            QueueMode::Fifo => by_time,
            QueueMode::Lifo => by_time.reverse(),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    }
}
