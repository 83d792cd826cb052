//! # Ferry Core
//!
//! Core traits, types, and errors for the Ferry opportunistic-forwarding
//! engine.
//!
//! This crate describes the boundary between the forwarding decision logic
//! (in `ferry-routing`) and the environment that drives it: the node set,
//! the simulation clock, live connections, buffered messages, and the
//! transfer scheduler that actually moves bytes.
//!
//! ## Key Traits
//!
//! - [`Clock`]: Monotonic simulation time
//! - [`NodeDirectory`]: The participating node set and current node locations
//! - [`PeerView`]: Read-only view of neighbouring nodes' forwarding state
//! - [`DeliveryEstimate`]: Capability exposed by nodes that keep a
//!   delivery-predictability table
//! - [`TransferScheduler`]: Accepts ranked candidates and attempts transfers
//!
//! ## Key Types
//!
//! - [`NodeId`]: Stable integer node address in `[0, N)`
//! - [`Message`]: Read-only view of a buffered message
//! - [`Connection`] and [`ContactEvent`]: Links between nodes
//! - [`Candidate`]: A (message, connection, utility) forwarding proposal

pub mod candidate;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod traits;

// Re-export main types
pub use candidate::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use message::*;
pub use traits::*;
