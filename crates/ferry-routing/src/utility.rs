//! Encounter and distance based scoring
//!
//! All scores are derived from the shared contact ledger and the current
//! node positions. Any ratio whose denominator is zero scores 0.

use ferry_core::{NodeDirectory, NodeError, NodeId};

use crate::cluster::NeighborFeatures;
use crate::contact::ContactTracker;

/// Scores candidates against one destination at a time
pub struct UtilityEstimator<'a, D: NodeDirectory + ?Sized> {
    tracker: &'a ContactTracker,
    directory: &'a D,
}

impl<'a, D: NodeDirectory + ?Sized> UtilityEstimator<'a, D> {
    pub fn new(tracker: &'a ContactTracker, directory: &'a D) -> Self {
        Self { tracker, directory }
    }

    /// Euclidean distance between two nodes' current locations
    pub fn distance(&self, a: NodeId, b: NodeId) -> Result<f64, NodeError> {
        let la = self
            .directory
            .location(a)
            .ok_or(NodeError::UnknownLocation(a))?;
        let lb = self
            .directory
            .location(b)
            .ok_or(NodeError::UnknownLocation(b))?;
        Ok(la.distance_to(&lb))
    }

    /// Share of `dest`'s encounters that were with `x`
    pub fn encounter_ratio(&self, dest: NodeId, x: NodeId) -> f64 {
        let sum = self.tracker.sum(dest);
        if sum == 0 {
            return 0.0;
        }
        self.tracker.count(dest, x) as f64 / sum as f64
    }

    /// Encounter ratio per unit of distance to `dest`
    pub fn encounter_distance(&self, dest: NodeId, x: NodeId) -> Result<f64, NodeError> {
        let dist = self.distance(x, dest)?;
        if dist == 0.0 {
            return Ok(0.0);
        }
        Ok(self.encounter_ratio(dest, x) / dist)
    }

    /// Distance from `x` to `dest` as a share of every node's distance to `dest`
    pub fn normalized_distance(&self, dest: NodeId, x: NodeId) -> Result<f64, NodeError> {
        let mut total = 0.0;
        for node in self.directory.nodes() {
            total += self.distance(node, dest)?;
        }
        if total == 0.0 {
            return Ok(0.0);
        }
        Ok(self.distance(x, dest)? / total)
    }

    /// Encounter ratio over normalized distance
    pub fn neighborhood_gamma(&self, dest: NodeId, x: NodeId) -> Result<f64, NodeError> {
        let beta = self.normalized_distance(dest, x)?;
        if beta == 0.0 {
            return Ok(0.0);
        }
        Ok(self.encounter_ratio(dest, x) / beta)
    }

    /// `[encounters(neighbor, dest), distance(neighbor, dest)]` per neighbour
    pub fn cluster_features(
        &self,
        dest: NodeId,
        neighbors: &[NodeId],
    ) -> Result<Vec<NeighborFeatures>, NodeError> {
        neighbors
            .iter()
            .map(|n| -> Result<NeighborFeatures, NodeError> {
                Ok(NeighborFeatures::new(
                    *n,
                    self.tracker.count(*n, dest) as f64,
                    self.distance(*n, dest)?,
                ))
            })
            .collect()
    }
}
