//! Scenario files
//!
//! A scenario is a fixed node layout plus a timeline: contacts coming up and
//! going down, and messages appearing in node buffers. Scenarios are JSON:
//!
//! ```json
//! {
//!   "name": "relay",
//!   "nodes": [{ "x": 0, "y": 0 }, { "x": 10, "y": 0 }],
//!   "contacts": [{ "a": 0, "b": 1, "at": 10.0, "up": true }],
//!   "messages": [{ "id": "M1", "source": 0, "destination": 1, "at": 0.0 }],
//!   "forwarding": { "seconds_in_time_unit": 60, "strategy": "probabilistic" },
//!   "tick_step": 10.0
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use ferry_core::{ContactEvent, Location, Message, MessageId, NodeId, SimTime};
use ferry_routing::{ForwardingConfig, ForwardingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

fn default_tick_step() -> f64 {
    10.0
}

/// A message that appears in its source's buffer at `at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    pub id: MessageId,
    pub source: NodeId,
    pub destination: NodeId,
    pub at: SimTime,
    #[serde(default)]
    pub size: u64,
}

impl Injection {
    pub fn new(id: impl Into<MessageId>, source: NodeId, destination: NodeId, at: SimTime) -> Self {
        Self {
            id: id.into(),
            source,
            destination,
            at,
            size: 0,
        }
    }

    /// The buffered message this injection produces
    pub fn message(&self) -> Message {
        Message::new(self.id.clone(), self.source, self.destination)
            .with_size(self.size)
            .received_at(self.at)
    }
}

/// A complete replayable scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    /// Node locations; node `i` is at `nodes[i]`
    pub nodes: Vec<Location>,

    #[serde(default)]
    pub contacts: Vec<ContactEvent>,

    #[serde(default)]
    pub messages: Vec<Injection>,

    /// Forwarding configuration shared by every node
    pub forwarding: ForwardingConfig,

    /// Seconds between forwarding passes
    #[serde(default = "default_tick_step")]
    pub tick_step: f64,

    /// Last simulated time; defaults to the last timeline entry
    #[serde(default)]
    pub end_time: Option<SimTime>,
}

impl Scenario {
    /// Parse a scenario from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load and validate a scenario file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Replace the strategy every node runs
    pub fn with_strategy(mut self, strategy: ForwardingStrategy) -> Self {
        self.forwarding.strategy = strategy;
        self
    }

    /// Time of the last contact or injection
    pub fn last_event_time(&self) -> SimTime {
        self.contacts
            .iter()
            .map(|c| c.at)
            .chain(self.messages.iter().map(|m| m.at))
            .fold(0.0, f64::max)
    }

    /// Time at which the replay stops
    pub fn end_time(&self) -> SimTime {
        self.end_time.unwrap_or_else(|| self.last_event_time())
    }

    /// Check the timeline against the node set
    ///
    /// Forwarding configuration is validated separately when the policies
    /// are built.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let node_count = self.nodes.len();
        if node_count == 0 {
            return Err(ScenarioError::NoNodes);
        }
        if !(self.tick_step.is_finite() && self.tick_step > 0.0) {
            return Err(ScenarioError::InvalidTickStep(self.tick_step));
        }

        let check = |node: NodeId, context: &'static str| {
            if node.index() < node_count {
                Ok(())
            } else {
                Err(ScenarioError::UnknownNode {
                    node,
                    node_count,
                    context,
                })
            }
        };

        for contact in &self.contacts {
            check(contact.a, "Contact")?;
            check(contact.b, "Contact")?;
            if contact.a == contact.b {
                return Err(ScenarioError::SelfContact(contact.a, contact.at));
            }
        }

        let mut seen = HashSet::new();
        for injection in &self.messages {
            check(injection.source, "Message source")?;
            check(injection.destination, "Message destination")?;
            if !seen.insert(&injection.id) {
                return Err(ScenarioError::DuplicateMessage(injection.id.clone()));
            }
        }

        Ok(())
    }

    /// Built-in six node scenario
    ///
    /// `n1` is a courier: it meets `n5`, then picks a message up from `n0`,
    /// then meets `n5` again. Nodes `n2`..`n4` form a chain that keeps the
    /// ledger busy without ever meeting `n0`.
    pub fn demo() -> Self {
        let up = ContactEvent::up;
        let down = ContactEvent::down;
        let n = NodeId;

        Self {
            name: "demo".to_string(),
            nodes: vec![
                Location::new(0.0, 0.0),
                Location::new(20.0, 5.0),
                Location::new(40.0, 0.0),
                Location::new(60.0, 10.0),
                Location::new(80.0, 0.0),
                Location::new(100.0, 5.0),
            ],
            contacts: vec![
                up(n(1), n(5), 10.0),
                up(n(2), n(3), 10.0),
                down(n(1), n(5), 20.0),
                down(n(2), n(3), 20.0),
                up(n(0), n(1), 30.0),
                up(n(3), n(4), 30.0),
                down(n(0), n(1), 40.0),
                down(n(3), n(4), 40.0),
                up(n(1), n(5), 60.0),
                up(n(4), n(5), 60.0),
                down(n(1), n(5), 70.0),
                down(n(4), n(5), 70.0),
            ],
            messages: vec![Injection::new("M1", n(0), n(5), 0.0)],
            forwarding: ForwardingConfig::probabilistic(60),
            tick_step: 10.0,
            end_time: Some(80.0),
        }
    }
}
