//! Forwarding-specific error types

use ferry_core::{NodeError, NodeId};
use thiserror::Error;

use crate::strategy::ForwardingStrategy;

/// Errors that can occur in the forwarding engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForwardingError {
    /// Configuration rejected at setup
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A peer does not expose the capability this strategy relies on
    #[error("Protocol mismatch: peer {peer} exposes no delivery predictability table ({strategy} strategy)")]
    ProtocolMismatch {
        peer: NodeId,
        strategy: ForwardingStrategy,
    },

    /// Node set errors
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// Contact ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A contact event was delivered to a node that is not an endpoint
    #[error("Contact {a}-{b} does not involve local node {local}")]
    NotParticipant { local: NodeId, a: NodeId, b: NodeId },

    /// Both endpoints of a contact event are the same node
    #[error("Contact at t={at} connects {node} to itself")]
    SelfContact { node: NodeId, at: f64 },
}

/// Configuration errors; none of these are recoverable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("seconds_in_time_unit is required")]
    MissingTimeUnit,

    #[error("seconds_in_time_unit must be positive (got {0})")]
    NonPositiveTimeUnit(i64),

    #[error("{name} must be a finite number (got {value})")]
    NotFinite { name: &'static str, value: f64 },
}

/// Contact ledger errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Node {node} is outside the ledger (size {node_count})")]
    NodeOutOfRange { node: NodeId, node_count: usize },
}

/// Result type for forwarding operations
pub type ForwardingResult<T> = Result<T, ForwardingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert!(format!("{}", ConfigError::MissingTimeUnit).contains("required"));
        let msg = format!("{}", ConfigError::NonPositiveTimeUnit(-3));
        assert!(msg.contains("-3"));
    }

    #[test]
    fn test_error_conversions() {
        let err: ForwardingError = ConfigError::MissingTimeUnit.into();
        assert!(matches!(err, ForwardingError::Config(_)));

        let err: ForwardingError = LedgerError::NodeOutOfRange {
            node: NodeId(8),
            node_count: 4,
        }
        .into();
        assert!(matches!(err, ForwardingError::Ledger(_)));

        let err: ForwardingError = NodeError::UnknownLocation(NodeId(1)).into();
        assert!(format!("{}", err).contains("n1"));
    }

    #[test]
    fn test_protocol_mismatch_display() {
        let err = ForwardingError::ProtocolMismatch {
            peer: NodeId(3),
            strategy: ForwardingStrategy::Probabilistic,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("n3"));
        assert!(msg.contains("probabilistic"));
    }
}
