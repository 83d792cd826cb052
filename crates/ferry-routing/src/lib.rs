//! # Ferry Routing
//!
//! Opportunistic forwarding decisions for delay-tolerant networks.
//!
//! Given a node's live connections and buffered messages, this crate decides
//! which messages to offer to which neighbours and in what order, based on
//! learned contact history. Moving bytes is left to an external
//! [`TransferScheduler`](ferry_core::TransferScheduler).
//!
//! ## Components
//!
//! - [`contact`]: Shared ledger of pairwise encounter counts
//! - [`prophet`]: Per-node delivery predictability with aging and transitivity
//! - [`readiness`]: Latch that holds back encounter-based forwarding until the
//!   ledger is populated
//! - [`cluster`]: Deterministic two-way partitioning of a node's neighbours
//! - [`utility`]: Encounter and distance based scores
//! - [`strategy`]: The selectable admission and ranking rules
//! - [`policy`]: Per-node orchestration of contacts and ticks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferry_core::{ManualClock, NodeId};
//! use ferry_routing::{ContactTracker, ForwardingConfig, ForwardingPolicy};
//!
//! let config = ForwardingConfig::probabilistic(30);
//! let tracker = Arc::new(ContactTracker::for_nodes(&world));
//! let gate = Arc::new(config.readiness_gate());
//! let clock = Arc::new(ManualClock::default());
//!
//! let policy = ForwardingPolicy::new(NodeId(0), config, tracker, gate, clock)?;
//! policy.on_contact(&event, &world)?;
//! let outcome = policy.tick(&world, &buffer, &connections, &mut scheduler)?;
//! ```

pub mod cluster;
pub mod contact;
pub mod error;
pub mod policy;
pub mod prophet;
pub mod readiness;
pub mod strategy;
pub mod utility;

// Re-export main types
pub use cluster::{ClusterLabel, ClusterReport, NeighborFeatures, partition};
pub use contact::{ContactTracker, EncounterKind};
pub use error::{ConfigError, ForwardingError, ForwardingResult, LedgerError};
pub use policy::{ContactOutcome, ForwardingPolicy, OfferReport, SkipReason, TickOutcome};
pub use prophet::{
    PredictabilitySnapshot, PredictabilityStore, ProphetConfig, SnapshotEntry, DEFAULT_BETA,
    GAMMA, P_INIT,
};
pub use readiness::{DEFAULT_ZERO_THRESHOLD, ReadinessGate};
pub use strategy::ForwardingStrategy;
pub use utility::UtilityEstimator;

use std::fmt;

use ferry_core::QueueMode;
use serde::{Deserialize, Serialize};

fn default_beta() -> f64 {
    DEFAULT_BETA
}

fn default_zero_threshold() -> f64 {
    DEFAULT_ZERO_THRESHOLD
}

/// Configuration for one node's forwarding policy
///
/// Every field except `seconds_in_time_unit` has a default. The time unit is
/// deliberately left unset until supplied and [`validate`](Self::validate)
/// rejects a configuration without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardingConfig {
    /// Seconds in one predictability aging unit (required, positive)
    #[serde(default)]
    pub seconds_in_time_unit: Option<i64>,

    /// Transitivity scaling constant
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Share of zero ledger cells below which the readiness gate opens
    #[serde(default = "default_zero_threshold")]
    pub zero_threshold: f64,

    #[serde(default)]
    pub strategy: ForwardingStrategy,

    /// Tie-break for candidates with equal scores
    #[serde(default)]
    pub queue_mode: QueueMode,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            seconds_in_time_unit: None,
            beta: DEFAULT_BETA,
            zero_threshold: DEFAULT_ZERO_THRESHOLD,
            strategy: ForwardingStrategy::default(),
            queue_mode: QueueMode::default(),
        }
    }
}

impl ForwardingConfig {
    /// Defaults for `strategy` with the given time unit
    pub fn for_strategy(strategy: ForwardingStrategy, seconds_in_time_unit: i64) -> Self {
        Self {
            seconds_in_time_unit: Some(seconds_in_time_unit),
            strategy,
            ..Default::default()
        }
    }

    /// Predictability-based forwarding
    pub fn probabilistic(seconds_in_time_unit: i64) -> Self {
        Self::for_strategy(ForwardingStrategy::Probabilistic, seconds_in_time_unit)
    }

    /// Encounter/distance forwarding behind the readiness gate
    pub fn encounter_distance(seconds_in_time_unit: i64) -> Self {
        Self::for_strategy(ForwardingStrategy::EncounterDistance, seconds_in_time_unit)
    }

    /// Flooding with per-message cluster diagnostics
    pub fn cluster(seconds_in_time_unit: i64) -> Self {
        Self::for_strategy(ForwardingStrategy::Cluster, seconds_in_time_unit)
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_zero_threshold(mut self, zero_threshold: f64) -> Self {
        self.zero_threshold = zero_threshold;
        self
    }

    pub fn with_queue_mode(mut self, queue_mode: QueueMode) -> Self {
        self.queue_mode = queue_mode;
        self
    }

    /// The validated time unit
    pub fn time_unit(&self) -> Result<u64, ConfigError> {
        match self.seconds_in_time_unit {
            None => Err(ConfigError::MissingTimeUnit),
            Some(secs) if secs <= 0 => Err(ConfigError::NonPositiveTimeUnit(secs)),
            Some(secs) => Ok(secs as u64),
        }
    }

    /// Check the configuration
    ///
    /// Hard errors halt setup. Suspicious but usable values come back as
    /// warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.time_unit()?;

        if !self.beta.is_finite() {
            return Err(ConfigError::NotFinite {
                name: "beta",
                value: self.beta,
            });
        }
        if !self.zero_threshold.is_finite() {
            return Err(ConfigError::NotFinite {
                name: "zero_threshold",
                value: self.zero_threshold,
            });
        }

        let mut warnings = Vec::new();
        if !(0.0..=1.0).contains(&self.beta) {
            warnings.push(ConfigWarning::BetaOutOfRange(self.beta));
        }
        if !(0.0..=1.0).contains(&self.zero_threshold) {
            warnings.push(ConfigWarning::ZeroThresholdOutOfRange(self.zero_threshold));
        }
        if self.zero_threshold <= 0.0 && self.strategy.is_gated() {
            warnings.push(ConfigWarning::GateNeverOpens);
        }
        Ok(warnings)
    }

    /// Predictability model parameters derived from this configuration
    pub fn prophet_config(&self) -> Result<ProphetConfig, ConfigError> {
        Ok(ProphetConfig::new(self.time_unit()?)?.with_beta(self.beta))
    }

    /// A fresh readiness gate using this configuration's threshold
    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::new(self.zero_threshold)
    }
}

/// Configuration values that are accepted but probably wrong
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    BetaOutOfRange(f64),
    ZeroThresholdOutOfRange(f64),
    /// A non-positive threshold keeps gated strategies on direct delivery forever
    GateNeverOpens,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::BetaOutOfRange(beta) => {
                write!(f, "beta {beta} is outside [0, 1]")
            }
            ConfigWarning::ZeroThresholdOutOfRange(threshold) => {
                write!(f, "zero_threshold {threshold} is outside [0, 1]")
            }
            ConfigWarning::GateNeverOpens => {
                write!(f, "zero_threshold <= 0: the readiness gate can never open")
            }
        }
    }
}
