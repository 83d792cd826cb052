//! Error types shared across Ferry crates

use thiserror::Error;

use crate::identity::NodeId;

/// Errors related to the node set
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("Node {node} is outside the node set (size {node_count})")]
    OutOfRange { node: NodeId, node_count: usize },

    #[error("No location known for node {0}")]
    UnknownLocation(NodeId),
}
