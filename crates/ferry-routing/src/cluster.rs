//! Two-way partitioning of a node's neighbours
//!
//! For a single message, every connected neighbour is described by how often
//! it met the destination and how far away from the destination it is. The
//! neighbours are split into two groups with a deterministic 2-means, and the
//! group that sits closer to the destination is labelled favorable.
//!
//! The labels are diagnostic. Forwarding does not filter on them.

use std::fmt;

use ferry_core::NodeId;
use serde::Serialize;

/// Upper bound on Lloyd iterations
pub const MAX_ITERATIONS: usize = 100;

/// Feature vector for one neighbour relative to a destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborFeatures {
    pub peer: NodeId,
    /// Encounters the neighbour recorded with the destination
    pub encounters: f64,
    /// Euclidean distance from the neighbour to the destination
    pub distance: f64,
}

impl NeighborFeatures {
    pub fn new(peer: NodeId, encounters: f64, distance: f64) -> Self {
        Self {
            peer,
            encounters,
            distance,
        }
    }

    fn point(&self) -> [f64; 2] {
        [self.encounters, self.distance]
    }
}

/// Which side of the partition a neighbour landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    Favorable,
    Unfavorable,
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterLabel::Favorable => write!(f, "favorable"),
            ClusterLabel::Unfavorable => write!(f, "unfavorable"),
        }
    }
}

/// Result of partitioning one message's neighbour set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    /// Cluster index per neighbour, in input order
    pub assignments: Vec<(NodeId, usize)>,
    /// `[mean encounters, mean distance]` per cluster
    pub centroids: Vec<[f64; 2]>,
    /// Index of the favorable cluster
    pub favorable: usize,
}

impl ClusterReport {
    /// Label for `peer`, if it took part in the partition
    pub fn label(&self, peer: NodeId) -> Option<ClusterLabel> {
        self.assignments
            .iter()
            .find(|(p, _)| *p == peer)
            .map(|(_, cluster)| {
                if *cluster == self.favorable {
                    ClusterLabel::Favorable
                } else {
                    ClusterLabel::Unfavorable
                }
            })
    }

    /// Neighbours in the favorable cluster, in input order
    pub fn favorable_peers(&self) -> Vec<NodeId> {
        self.assignments
            .iter()
            .filter(|(_, c)| *c == self.favorable)
            .map(|(p, _)| *p)
            .collect()
    }
}

fn squared_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

fn nearest(point: [f64; 2], centroids: &[[f64; 2]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, *c);
        // Strict comparison keeps ties on the lower index
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Partition `features` into at most two clusters
///
/// Seeding is deterministic: the first neighbour and the neighbour farthest
/// from it. Returns `None` when there are no neighbours. If every neighbour
/// has the same features the result is a single favorable cluster.
pub fn partition(features: &[NeighborFeatures]) -> Option<ClusterReport> {
    let first = features.first()?.point();

    let (far_idx, far_dist) = features
        .iter()
        .enumerate()
        .map(|(i, f)| (i, squared_distance(first, f.point())))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if far_dist == 0.0 {
        return Some(ClusterReport {
            assignments: features.iter().map(|f| (f.peer, 0)).collect(),
            centroids: vec![first],
            favorable: 0,
        });
    }

    let mut centroids = vec![first, features[far_idx].point()];
    let mut assignments: Vec<usize> = vec![usize::MAX; features.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (slot, f) in assignments.iter_mut().zip(features) {
            let cluster = nearest(f.point(), &centroids);
            if *slot != cluster {
                *slot = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (k, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<[f64; 2]> = assignments
                .iter()
                .zip(features)
                .filter(|(c, _)| **c == k)
                .map(|(_, f)| f.point())
                .collect();
            // An emptied cluster keeps its previous centroid
            if !members.is_empty() {
                let n = members.len() as f64;
                *centroid = [
                    members.iter().map(|p| p[0]).sum::<f64>() / n,
                    members.iter().map(|p| p[1]).sum::<f64>() / n,
                ];
            }
        }
    }

    let favorable = favorable_cluster(&centroids);
    Some(ClusterReport {
        assignments: features
            .iter()
            .zip(assignments)
            .map(|(f, c)| (f.peer, c))
            .collect(),
        centroids,
        favorable,
    })
}

/// Lower mean distance wins; ties go to more encounters, then to cluster 0
fn favorable_cluster(centroids: &[[f64; 2]]) -> usize {
    let mut best = 0;
    for (i, c) in centroids.iter().enumerate().skip(1) {
        let b = centroids[best];
        if c[1] < b[1] || (c[1] == b[1] && c[0] > b[0]) {
            best = i;
        }
    }
    best
}
