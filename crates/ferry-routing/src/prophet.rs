//! Delivery predictability (PRoPHET-style) for a single node
//!
//! Each node keeps a belief about how likely it is to deliver to every other
//! node it has learned about. Beliefs grow on direct contact, spread through
//! intermediaries, and decay with simulation time.
//!
//! Key rules:
//! - **Direct contact**: `P(a,b) = P(a,b)_old + (1 - P(a,b)_old) * P_INIT`
//! - **Transitivity**: `P(a,c) = P(a,c)_old + (1 - P(a,c)_old) * P(a,b) * P(b,c) * beta`
//! - **Aging**: `P(a,b) = P(a,b)_old * GAMMA^k`, with `k` the (fractional)
//!   number of time units elapsed since the table was last aged
//!
//! Aging is lazy. Every read ages the whole table first, so a read is not
//! side-effect free: it moves the last-aged timestamp forward. Reads at the
//! same simulated time are idempotent.

use std::collections::HashMap;
use std::fmt;

use ferry_core::{DeliveryEstimate, NodeId, SimTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Delivery predictability initialization constant
pub const P_INIT: f64 = 0.75;
/// Default transitivity scaling constant
pub const DEFAULT_BETA: f64 = 0.25;
/// Delivery predictability aging constant
pub const GAMMA: f64 = 0.98;

/// Predictability model configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProphetConfig {
    /// Value gained on first contact (P_init)
    pub initial_probability: f64,
    /// Decay per elapsed time unit (gamma)
    pub aging_constant: f64,
    /// Transitivity scaling factor (beta)
    pub transitivity_constant: f64,
    /// Seconds in one aging time unit
    pub seconds_in_time_unit: u64,
}

impl ProphetConfig {
    /// Create a configuration with the standard constants
    ///
    /// The time unit has no sensible default and must be positive.
    pub fn new(seconds_in_time_unit: u64) -> Result<Self, ConfigError> {
        if seconds_in_time_unit == 0 {
            return Err(ConfigError::NonPositiveTimeUnit(0));
        }
        Ok(Self {
            initial_probability: P_INIT,
            aging_constant: GAMMA,
            transitivity_constant: DEFAULT_BETA,
            seconds_in_time_unit,
        })
    }

    /// Override the transitivity constant
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.transitivity_constant = beta;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct PredictabilityEntry {
    probability: f64,
    /// Last simulated time the value was changed by a contact or transitive update
    updated_at: SimTime,
}

#[derive(Debug)]
struct Table {
    entries: HashMap<NodeId, PredictabilityEntry>,
    last_aged: SimTime,
}

/// One node's delivery-predictability table
///
/// Entries are created on first contact (direct or transitive), mutated on
/// every contact and every read, and never deleted. Values are not clamped.
#[derive(Debug)]
pub struct PredictabilityStore {
    local_id: NodeId,
    table: RwLock<Table>,
    config: ProphetConfig,
}

impl PredictabilityStore {
    /// Create an empty table for `local_id`
    pub fn new(local_id: NodeId, config: ProphetConfig) -> Self {
        Self {
            local_id,
            table: RwLock::new(Table {
                entries: HashMap::new(),
                last_aged: 0.0,
            }),
            config,
        }
    }

    /// The node this table belongs to
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn config(&self) -> &ProphetConfig {
        &self.config
    }

    /// Simulation time at which the table was last aged
    pub fn last_aged(&self) -> SimTime {
        self.table.read().last_aged
    }

    /// Number of targets with an entry
    pub fn known_targets(&self) -> usize {
        self.table.read().entries.len()
    }

    fn age_locked(&self, table: &mut Table, now: SimTime) {
        let k = (now - table.last_aged) / self.config.seconds_in_time_unit as f64;
        if k <= 0.0 {
            return;
        }

        let mult = self.config.aging_constant.powf(k);
        for entry in table.entries.values_mut() {
            entry.probability *= mult;
        }
        table.last_aged = now;
    }

    /// Age every entry up to `now`
    ///
    /// No-op when no time has elapsed since the last aging.
    pub fn age(&self, now: SimTime) {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);
    }

    /// Record a direct contact with `peer`
    ///
    /// Returns the new predictability for `peer`.
    pub fn record_contact(&self, peer: NodeId, now: SimTime) -> f64 {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);

        let old = table
            .entries
            .get(&peer)
            .map(|e| e.probability)
            .unwrap_or(0.0);
        let new = old + (1.0 - old) * self.config.initial_probability;

        table.entries.insert(
            peer,
            PredictabilityEntry {
                probability: new,
                updated_at: now,
            },
        );
        new
    }

    /// Predictability for `target` after aging to `now`; 0 if unknown
    pub fn predictability(&self, target: NodeId, now: SimTime) -> f64 {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);
        table
            .entries
            .get(&target)
            .map(|e| e.probability)
            .unwrap_or(0.0)
    }

    /// Apply transitive updates learned from `peer`'s table
    ///
    /// Every entry in `peer_table` except the one for this node is folded in:
    ///   `P(a,c) = P(a,c)_old + (1 - P(a,c)_old) * P(a,b) * P(b,c) * beta`
    ///
    /// Returns the number of entries updated.
    pub fn propagate_transitive(
        &self,
        peer: NodeId,
        peer_table: &[(NodeId, f64)],
        now: SimTime,
    ) -> usize {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);

        let p_ab = table
            .entries
            .get(&peer)
            .map(|e| e.probability)
            .unwrap_or(0.0);
        let beta = self.config.transitivity_constant;

        let mut updated = 0;
        for (target, p_bc) in peer_table {
            if *target == self.local_id {
                continue;
            }

            let p_old = table
                .entries
                .get(target)
                .map(|e| e.probability)
                .unwrap_or(0.0);
            let p_new = p_old + (1.0 - p_old) * p_ab * p_bc * beta;

            table.entries.insert(
                *target,
                PredictabilityEntry {
                    probability: p_new,
                    updated_at: now,
                },
            );
            updated += 1;
        }
        updated
    }

    /// Every entry after aging to `now`, in target order
    pub fn table(&self, now: SimTime) -> Vec<(NodeId, f64)> {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);

        let mut entries: Vec<(NodeId, f64)> = table
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.probability))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Read-only diagnostic snapshot after aging to `now`
    pub fn snapshot(&self, now: SimTime) -> PredictabilitySnapshot {
        let mut table = self.table.write();
        self.age_locked(&mut table, now);

        let mut entries: Vec<SnapshotEntry> = table
            .entries
            .iter()
            .map(|(id, entry)| SnapshotEntry {
                target: *id,
                probability: entry.probability,
                updated_at: entry.updated_at,
            })
            .collect();
        entries.sort_by_key(|e| e.target);

        PredictabilitySnapshot {
            node: self.local_id,
            taken_at: now,
            entries,
        }
    }
}

impl DeliveryEstimate for PredictabilityStore {
    fn predictability(&self, target: NodeId, now: SimTime) -> f64 {
        PredictabilityStore::predictability(self, target, now)
    }

    fn delivery_table(&self, now: SimTime) -> Vec<(NodeId, f64)> {
        self.table(now)
    }
}

/// A single row of a [`PredictabilitySnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub target: NodeId,
    pub probability: f64,
    pub updated_at: SimTime,
}

/// Point-in-time copy of a node's predictability table for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictabilitySnapshot {
    pub node: NodeId,
    pub taken_at: SimTime,
    pub entries: Vec<SnapshotEntry>,
}

impl PredictabilitySnapshot {
    /// Predictability recorded for `target`, if any
    pub fn get(&self, target: NodeId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.target == target)
            .map(|e| e.probability)
    }
}

impl fmt::Display for PredictabilitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} delivery prediction(s) at t={}",
            self.node,
            self.entries.len(),
            self.taken_at
        )?;
        for entry in &self.entries {
            writeln!(f, "  {} : {:.6}", entry.target, entry.probability)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: u64 = 30;

    fn store(local: u32) -> PredictabilityStore {
        PredictabilityStore::new(NodeId(local), ProphetConfig::new(UNIT).unwrap())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_zero_time_unit_rejected() {
        assert_eq!(
            ProphetConfig::new(0).unwrap_err(),
            ConfigError::NonPositiveTimeUnit(0)
        );
    }

    #[test]
    fn test_unknown_target_is_zero() {
        let s = store(0);
        assert_eq!(s.predictability(NodeId(4), 0.0), 0.0);
        assert_eq!(s.known_targets(), 0);
    }

    #[test]
    fn test_first_contact_is_p_init() {
        let s = store(0);
        let p = s.record_contact(NodeId(1), 0.0);
        assert_eq!(p, 0.75);
        assert_eq!(s.predictability(NodeId(1), 0.0), 0.75);
    }

    #[test]
    fn test_repeated_contacts_increase() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);
        let p2 = s.record_contact(NodeId(1), 0.0);
        assert!(approx(p2, 0.75 + 0.25 * 0.75));
        assert!(p2 < 1.0);
    }

    #[test]
    fn test_aging_decay_law() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);

        let before = s.predictability(NodeId(1), 100.0);
        let after = s.predictability(NodeId(1), 100.0 + UNIT as f64);
        assert!(approx(after, before * 0.98));
    }

    #[test]
    fn test_one_unit_after_first_contact() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);
        assert!(approx(s.predictability(NodeId(1), UNIT as f64), 0.735));
    }

    #[test]
    fn test_fractional_aging() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);
        let half = s.predictability(NodeId(1), UNIT as f64 / 2.0);
        assert!(approx(half, 0.75 * 0.98f64.powf(0.5)));
    }

    #[test]
    fn test_aging_idempotent_at_same_time() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);
        s.record_contact(NodeId(2), 0.0);

        s.age(90.0);
        let first = s.table(90.0);
        s.age(90.0);
        let second = s.table(90.0);

        assert_eq!(first, second);
        assert_eq!(s.last_aged(), 90.0);
    }

    #[test]
    fn test_read_moves_last_aged() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);
        assert_eq!(s.last_aged(), 0.0);

        s.predictability(NodeId(1), 60.0);
        assert_eq!(s.last_aged(), 60.0);
    }

    #[test]
    fn test_time_going_backwards_is_ignored() {
        let s = store(0);
        s.record_contact(NodeId(1), 60.0);
        let p = s.predictability(NodeId(1), 30.0);
        assert_eq!(p, 0.75);
        assert_eq!(s.last_aged(), 60.0);
    }

    #[test]
    fn test_transitivity_arithmetic() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);

        let updated = s.propagate_transitive(NodeId(1), &[(NodeId(2), 0.5)], 0.0);
        assert_eq!(updated, 1);
        assert!(approx(s.predictability(NodeId(2), 0.0), 0.09375));
    }

    #[test]
    fn test_transitivity_skips_self() {
        let s = store(0);
        s.record_contact(NodeId(1), 0.0);

        let peer_table = vec![(NodeId(0), 0.9), (NodeId(2), 0.5)];
        let updated = s.propagate_transitive(NodeId(1), &peer_table, 0.0);

        assert_eq!(updated, 1);
        assert_eq!(s.predictability(NodeId(0), 0.0), 0.0);
        assert_eq!(s.known_targets(), 2);
    }

    #[test]
    fn test_transitivity_between_stores() {
        let a = store(0);
        let b = store(1);

        b.record_contact(NodeId(2), 0.0);
        b.record_contact(NodeId(2), 0.0);
        a.record_contact(NodeId(1), 0.0);

        a.propagate_transitive(NodeId(1), &b.delivery_table(0.0), 0.0);
        assert!(a.predictability(NodeId(2), 0.0) > 0.0);
    }

    #[test]
    fn test_custom_beta() {
        let config = ProphetConfig::new(UNIT).unwrap().with_beta(0.5);
        let s = PredictabilityStore::new(NodeId(0), config);
        s.record_contact(NodeId(1), 0.0);
        s.propagate_transitive(NodeId(1), &[(NodeId(2), 0.5)], 0.0);
        assert!(approx(s.predictability(NodeId(2), 0.0), 0.1875));
    }

    #[test]
    fn test_snapshot() {
        let s = store(0);
        s.record_contact(NodeId(2), 0.0);
        s.record_contact(NodeId(1), 0.0);

        let snap = s.snapshot(UNIT as f64);
        assert_eq!(snap.node, NodeId(0));
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.entries[0].target, NodeId(1));
        assert!(approx(snap.get(NodeId(2)).unwrap(), 0.735));
        assert!(snap.get(NodeId(7)).is_none());

        let text = snap.to_string();
        assert!(text.contains("2 delivery prediction(s)"));
        assert!(text.contains("n1 : 0.735000"));
    }

    #[test]
    fn test_snapshot_serializes_for_reports() {
        let a = store(0);
        a.record_contact(NodeId(1), 0.0);

        let json = serde_json::to_value(a.snapshot(0.0)).unwrap();
        assert_eq!(json["node"], 0);
        assert_eq!(json["entries"][0]["target"], 1);
        assert_eq!(json["entries"][0]["probability"], 0.75);

        let back: PredictabilitySnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, a.snapshot(0.0));
    }
}
