//! Encounter-saturation readiness gate
//!
//! Speculative forwarding based on encounter statistics is meaningless while
//! the shared ledger is mostly empty. The gate stays closed until fewer than
//! `N * N * zero_threshold` ledger cells are still zero, then latches open.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::contact::ContactTracker;

/// Default share of zero ledger cells below which the gate opens
pub const DEFAULT_ZERO_THRESHOLD: f64 = 0.25;

/// One-way latch over the shared contact ledger
#[derive(Debug)]
pub struct ReadinessGate {
    zero_threshold: f64,
    started: AtomicBool,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(DEFAULT_ZERO_THRESHOLD)
    }
}

impl ReadinessGate {
    pub fn new(zero_threshold: f64) -> Self {
        Self {
            zero_threshold,
            started: AtomicBool::new(false),
        }
    }

    pub fn zero_threshold(&self) -> f64 {
        self.zero_threshold
    }

    /// Whether speculative forwarding is allowed
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Re-evaluate the gate against the ledger
    ///
    /// Returns true only on the call that opened the gate.
    pub fn observe(&self, tracker: &ContactTracker) -> bool {
        if self.is_started() {
            return false;
        }

        let n = tracker.node_count() as f64;
        let zeros = tracker.zero_cells();
        if (zeros as f64) < n * n * self.zero_threshold
            && !self.started.swap(true, Ordering::AcqRel)
        {
            tracing::info!(
                zero_cells = zeros,
                node_count = tracker.node_count(),
                threshold = self.zero_threshold,
                "Readiness gate opened"
            );
            return true;
        }
        false
    }
}
