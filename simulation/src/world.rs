//! The replayed environment
//!
//! [`TraceWorld`] owns everything the forwarding engine treats as external:
//! node locations, live connections, per-node buffers and transfer state.
//! It answers the engine's [`NodeDirectory`] and [`PeerView`] queries and
//! applies the transfers an [`InstantScheduler`] accepts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ferry_core::{
    Candidate, Clock, Connection, ContactEvent, DeliveryEstimate, Location, Message, MessageId,
    NodeDirectory, NodeId, PeerView, PolicyId, SimTime, TransferOutcome, TransferScheduler,
};
use ferry_routing::{ContactTracker, ForwardingConfig, ForwardingPolicy, ForwardingResult};
use tracing::{debug, info};

/// What happened to a message that arrived at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First copy to reach the destination
    Delivered,
    /// The destination already had it
    Duplicate,
    /// Stored by an intermediate node
    Relayed,
}

/// Nodes, their policies, buffers and connections
pub struct TraceWorld {
    locations: Vec<Location>,
    policies: Vec<ForwardingPolicy>,
    buffers: Vec<Vec<Message>>,
    connections: HashSet<(NodeId, NodeId)>,
    busy: HashSet<NodeId>,
    /// message -> (destination, delivery time)
    delivered: HashMap<MessageId, (NodeId, SimTime)>,
}

impl TraceWorld {
    /// Build one policy per node, all sharing a ledger, a gate and `clock`
    pub fn new(
        locations: Vec<Location>,
        config: &ForwardingConfig,
        clock: Arc<dyn Clock>,
    ) -> ForwardingResult<Self> {
        let count = locations.len();
        let tracker = Arc::new(ContactTracker::new(count));
        let gate = Arc::new(config.readiness_gate());

        let policies = NodeId::range(count)
            .into_iter()
            .map(|node| {
                ForwardingPolicy::new(
                    node,
                    config.clone(),
                    tracker.clone(),
                    gate.clone(),
                    clock.clone(),
                )
            })
            .collect::<ForwardingResult<Vec<_>>>()?;

        info!(nodes = count, strategy = %config.strategy, "World created");

        Ok(Self {
            locations,
            policies,
            buffers: vec![Vec::new(); count],
            connections: HashSet::new(),
            busy: HashSet::new(),
            delivered: HashMap::new(),
        })
    }

    pub fn policies(&self) -> &[ForwardingPolicy] {
        &self.policies
    }

    pub fn policy(&self, node: NodeId) -> Option<&ForwardingPolicy> {
        self.policies.get(node.index())
    }

    pub fn tracker(&self) -> Option<&Arc<ContactTracker>> {
        self.policies.first().map(|p| p.tracker())
    }

    /// Messages currently buffered at `node`
    pub fn buffer(&self, node: NodeId) -> &[Message] {
        self.buffers
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Place a message in its source's buffer
    pub fn inject(&mut self, message: Message) {
        if let Some(buffer) = self.buffers.get_mut(message.source.index()) {
            debug!(message = %message.id, source = %message.source, destination = %message.destination, "Message injected");
            buffer.push(message);
        }
    }

    /// Bring a connection up or down
    pub fn apply_contact(&mut self, event: &ContactEvent) {
        let key = Self::link_key(event.a, event.b);
        if event.up {
            self.connections.insert(key);
        } else {
            self.connections.remove(&key);
        }
    }

    fn link_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Live connections with `node` as an endpoint, in peer order
    pub fn connections_of(&self, node: NodeId) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self
            .connections
            .iter()
            .filter(|(a, b)| *a == node || *b == node)
            .map(|(a, b)| Connection::up(*a, *b))
            .collect();
        connections.sort_by_key(|c| c.other(node));
        connections
    }

    pub fn live_connections(&self) -> usize {
        self.connections.len()
    }

    /// Forget which nodes were busy during the previous step
    pub fn clear_busy(&mut self) {
        self.busy.clear();
    }

    /// Move a copy of the candidate's message to its peer
    ///
    /// Both endpoints stay busy for the rest of the step.
    pub fn transfer(&mut self, from: NodeId, candidate: &Candidate, now: SimTime) -> Arrival {
        self.busy.insert(from);
        self.busy.insert(candidate.peer);

        let message = &candidate.message;
        if candidate.is_direct_delivery() {
            if self.delivered.contains_key(&message.id) {
                return Arrival::Duplicate;
            }
            info!(message = %message.id, from = %from, to = %candidate.peer, at = now, "Message delivered");
            self.delivered
                .insert(message.id.clone(), (candidate.peer, now));
            return Arrival::Delivered;
        }

        if let Some(buffer) = self.buffers.get_mut(candidate.peer.index()) {
            if !buffer.iter().any(|m| m.id == message.id) {
                buffer.push(message.clone().received_at(now));
            }
        }
        debug!(message = %message.id, from = %from, to = %candidate.peer, "Message relayed");
        Arrival::Relayed
    }

    /// When `message` reached its destination, if it has
    pub fn delivered_at(&self, message: &MessageId) -> Option<SimTime> {
        self.delivered.get(message).map(|(_, at)| *at)
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

impl NodeDirectory for TraceWorld {
    fn node_count(&self) -> usize {
        self.locations.len()
    }

    fn location(&self, node: NodeId) -> Option<Location> {
        self.locations.get(node.index()).copied()
    }
}

impl PeerView for TraceWorld {
    fn policy_id(&self, node: NodeId) -> Option<PolicyId> {
        self.policy(node).map(|p| p.id())
    }

    fn is_transferring(&self, node: NodeId) -> bool {
        self.busy.contains(&node)
    }

    fn has_message(&self, node: NodeId, message: &MessageId) -> bool {
        let delivered_here = self
            .delivered
            .get(message)
            .is_some_and(|(destination, _)| *destination == node);
        delivered_here || self.buffer(node).iter().any(|m| &m.id == message)
    }

    fn delivery_estimate(&self, node: NodeId) -> Option<&dyn DeliveryEstimate> {
        self.policy(node)
            .and_then(|p| p.delivery_estimate())
            .map(|store| store as &dyn DeliveryEstimate)
    }
}

/// Scheduler with unlimited bandwidth and a single radio
///
/// Accepts the head of every offer and rejects the rest: a node moves at
/// most one message per step.
#[derive(Debug, Default)]
pub struct InstantScheduler {
    accepted: Option<Candidate>,
}

impl InstantScheduler {
    /// The candidate accepted since the last call
    pub fn take_accepted(&mut self) -> Option<Candidate> {
        self.accepted.take()
    }
}

impl TransferScheduler for InstantScheduler {
    fn offer(&mut self, candidates: &[Candidate]) -> Vec<TransferOutcome> {
        if self.accepted.is_some() {
            return vec![TransferOutcome::Rejected; candidates.len()];
        }
        let Some(head) = candidates.first() else {
            return Vec::new();
        };
        self.accepted = Some(head.clone());

        let mut outcomes = vec![TransferOutcome::Rejected; candidates.len()];
        outcomes[0] = TransferOutcome::Accepted;
        outcomes
    }
}
