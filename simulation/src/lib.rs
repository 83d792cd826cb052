//! # Ferry Simulation
//!
//! A contact-trace replayer for the Ferry forwarding engine.
//!
//! ## Overview
//!
//! The forwarding engine only decides what to offer to whom. This crate
//! supplies everything around it:
//!
//! - **Scenarios** (`scenario.rs`): JSON node layouts, contact timelines and
//!   message injections
//! - **World** (`world.rs`): Buffers, connections and transfer state behind
//!   the engine's `NodeDirectory` and `PeerView` traits, plus a
//!   single-radio scheduler
//! - **Simulation** (`simulation.rs`): Discrete-time replay and run statistics
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_simulation::{Scenario, Simulation};
//!
//! let mut sim = Simulation::new(Scenario::demo())?;
//! let stats = sim.run()?;
//! println!("{stats}");
//! ```

pub mod error;
pub mod scenario;
pub mod simulation;
pub mod world;

// Re-export main types
pub use error::{ScenarioError, SimulationError, SimulationResult};
pub use scenario::{Injection, Scenario};
pub use simulation::{RunStats, Simulation};
pub use world::{Arrival, InstantScheduler, TraceWorld};
