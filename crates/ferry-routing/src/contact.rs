//! Shared contact ledger
//!
//! Encounter statistics are a property of node pairs, not of individual
//! policy instances, so a single [`ContactTracker`] is created per node set
//! and handed to every node's policy behind an `Arc`.
//!
//! The ledger holds:
//! - `count[a][b]`: how many times `a` recorded an encounter with `b`
//! - `sum[a]`: how many encounters `a` recorded in total
//!
//! Counts only ever grow.

use ferry_core::{NodeDirectory, NodeId};
use parking_lot::RwLock;

use crate::error::LedgerError;

/// How an encounter is written to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterKind {
    /// Endpoints are driven by distinct policy instances: only the
    /// recording side's row and sum are incremented
    Directed,
    /// Both endpoints are driven by the same policy instance: both
    /// directions and both sums are incremented
    Mutual,
}

#[derive(Debug)]
struct Ledger {
    /// Row-major `node_count x node_count` matrix
    counts: Vec<u32>,
    sums: Vec<u64>,
}

/// Pairwise encounter counts and per-node encounter totals
#[derive(Debug)]
pub struct ContactTracker {
    node_count: usize,
    ledger: RwLock<Ledger>,
}

impl ContactTracker {
    /// Create an empty ledger for `node_count` nodes
    ///
    /// The ledger cannot be resized afterwards.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            ledger: RwLock::new(Ledger {
                counts: vec![0; node_count * node_count],
                sums: vec![0; node_count],
            }),
        }
    }

    /// Create a ledger sized from the authoritative node set
    pub fn for_nodes<D: NodeDirectory + ?Sized>(directory: &D) -> Self {
        Self::new(directory.node_count())
    }

    /// Number of nodes the ledger was sized for
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    fn check(&self, node: NodeId) -> Result<usize, LedgerError> {
        let idx = node.index();
        if idx < self.node_count {
            Ok(idx)
        } else {
            Err(LedgerError::NodeOutOfRange {
                node,
                node_count: self.node_count,
            })
        }
    }

    /// Record that `a` encountered `b`
    ///
    /// Fails without touching the ledger if either node is out of range.
    pub fn record_encounter(
        &self,
        a: NodeId,
        b: NodeId,
        kind: EncounterKind,
    ) -> Result<(), LedgerError> {
        let ia = self.check(a)?;
        let ib = self.check(b)?;
        let n = self.node_count;

        let mut ledger = self.ledger.write();
        ledger.counts[ia * n + ib] += 1;
        ledger.sums[ia] += 1;

        if kind == EncounterKind::Mutual {
            ledger.counts[ib * n + ia] += 1;
            ledger.sums[ib] += 1;
        }

        tracing::trace!(%a, %b, ?kind, "Recorded encounter");
        Ok(())
    }

    /// Encounters `a` recorded with `b`; 0 for unseen or unknown pairs
    pub fn count(&self, a: NodeId, b: NodeId) -> u32 {
        match (self.check(a), self.check(b)) {
            (Ok(ia), Ok(ib)) => self.ledger.read().counts[ia * self.node_count + ib],
            _ => 0,
        }
    }

    /// Total encounters recorded by `node`; 0 for unseen or unknown nodes
    pub fn sum(&self, node: NodeId) -> u64 {
        match self.check(node) {
            Ok(idx) => self.ledger.read().sums[idx],
            Err(_) => 0,
        }
    }

    /// Number of matrix cells that are still zero
    pub fn zero_cells(&self) -> usize {
        self.ledger.read().counts.iter().filter(|c| **c == 0).count()
    }

    /// Sum of every cell in the matrix
    pub fn total_encounters(&self) -> u64 {
        self.ledger.read().counts.iter().map(|c| *c as u64).sum()
    }
}
