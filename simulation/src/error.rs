//! Error types for the trace replayer

use std::path::PathBuf;

use ferry_core::{MessageId, NodeId};
use ferry_routing::ForwardingError;
use thiserror::Error;

/// Problems with a scenario file, found before anything runs
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Scenario declares no nodes")]
    NoNodes,

    #[error("{context} refers to {node}, but the scenario has {node_count} node(s)")]
    UnknownNode {
        node: NodeId,
        node_count: usize,
        context: &'static str,
    },

    #[error("Contact at t={1} connects {0} to itself")]
    SelfContact(NodeId, f64),

    #[error("Message {0} is injected more than once")]
    DuplicateMessage(MessageId),

    #[error("Tick step must be positive and finite, got {0}")]
    InvalidTickStep(f64),
}

/// Errors raised while replaying a scenario
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("Forwarding failed: {0}")]
    Forwarding(#[from] ForwardingError),
}

pub type SimulationResult<T> = Result<T, SimulationError>;
