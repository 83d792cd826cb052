//! Node and policy identities, and node locations
//!
//! Nodes are addressed by a dense integer in `[0, N)` so that per-pair
//! statistics can live in flat matrices. Policy instances carry their own
//! identity, separate from the node they drive.

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Stable node address in `[0, N)`
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("n{_0}")]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node id from a raw address
    pub const fn new(address: u32) -> Self {
        Self(address)
    }

    /// The address as a matrix index
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Generate all node ids `0..count`
    pub fn range(count: usize) -> Vec<Self> {
        (0..count as u32).map(Self).collect()
    }
}

impl From<u32> for NodeId {
    fn from(address: u32) -> Self {
        Self(address)
    }
}

static NEXT_POLICY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a forwarding-policy instance
///
/// Two endpoints of a contact are "driven by the same instance" exactly
/// when their policy ids are equal.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("policy#{_0}")]
pub struct PolicyId(pub u64);

impl PolicyId {
    /// Mint a fresh, process-unique policy id
    pub fn next() -> Self {
        Self(NEXT_POLICY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A 2-D node position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another location
    pub fn distance_to(&self, other: &Location) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}
