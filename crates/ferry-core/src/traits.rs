//! Core traits for Ferry
//!
//! These traits describe the collaborators the forwarding engine consumes
//! without owning them, so the same decision logic can be driven by a
//! contact-trace replay, a discrete-event simulator, or a test fake.
//!
//! ## Key Traits
//!
//! - [`Clock`]: Simulation time
//! - [`NodeDirectory`]: Node set and current locations
//! - [`PeerView`]: Per-neighbour state the engine needs to filter candidates
//! - [`DeliveryEstimate`]: Narrow capability for reading a peer's
//!   delivery-predictability table
//! - [`TransferScheduler`]: Attempts the ranked transfers

use std::sync::atomic::{AtomicU64, Ordering};

use crate::candidate::{Candidate, TransferOutcome};
use crate::identity::{Location, NodeId, PolicyId};
use crate::message::MessageId;

/// Simulation time in seconds
pub type SimTime = f64;

/// Time abstraction
///
/// Implementations must be monotonic: `now()` never decreases.
pub trait Clock: Send + Sync {
    /// Current simulation time in seconds
    fn now(&self) -> SimTime;
}

/// Manually advanced clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: SimTime) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Jump to an absolute time (ignored if it would move backwards)
    pub fn set(&self, now: SimTime) {
        if now >= self.now() {
            self.bits.store(now.to_bits(), Ordering::SeqCst);
        }
    }

    /// Advance by `seconds`
    pub fn advance(&self, seconds: SimTime) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SimTime {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// The full, stable set of participating nodes and where they are now
pub trait NodeDirectory {
    /// Number of nodes; addresses are `0..node_count()`
    fn node_count(&self) -> usize;

    /// Current location of a node
    fn location(&self, node: NodeId) -> Option<Location>;

    /// All node ids in address order
    fn nodes(&self) -> Vec<NodeId> {
        NodeId::range(self.node_count())
    }
}

/// Read-only access to a node's delivery-predictability table
///
/// Reads refresh (age) the table before answering, so they take `&self`
/// but are not side-effect free.
pub trait DeliveryEstimate {
    /// Predictability of delivering to `target`, or 0 if unknown
    fn predictability(&self, target: NodeId, now: SimTime) -> f64;

    /// Every (target, predictability) entry currently held
    fn delivery_table(&self, now: SimTime) -> Vec<(NodeId, f64)>;
}

/// What the engine may observe about other nodes
pub trait PeerView {
    /// Identity of the policy instance driving `node`, if any
    fn policy_id(&self, node: NodeId) -> Option<PolicyId>;

    /// Whether `node` is currently busy with a transfer
    fn is_transferring(&self, node: NodeId) -> bool;

    /// Whether `node` already buffers the message
    fn has_message(&self, node: NodeId, message: &MessageId) -> bool;

    /// Delivery-predictability capability of `node`, if its policy keeps one
    fn delivery_estimate(&self, node: NodeId) -> Option<&dyn DeliveryEstimate>;
}

/// Accepts an ordered candidate list and attempts transfers
///
/// Bandwidth and contention are the scheduler's business. The returned
/// outcomes are positional: `outcomes[i]` belongs to `candidates[i]`.
/// Candidates the scheduler never reached may be reported as rejected or
/// omitted from the tail.
pub trait TransferScheduler {
    fn offer(&mut self, candidates: &[Candidate]) -> Vec<TransferOutcome>;
}
