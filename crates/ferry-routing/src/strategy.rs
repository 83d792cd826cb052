//! Forwarding strategy selection
//!
//! A strategy is picked once, at configuration time, and decides which
//! (message, neighbour) pairs are admitted on a tick and how they are ranked.
//! Every strategy shares the same contact ledger, readiness gate and clock.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Candidate admission and ranking rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingStrategy {
    /// Offer a message to a neighbour whose delivery predictability for the
    /// destination exceeds ours
    ///
    /// Ranked by the neighbour's predictability, highest first.
    #[default]
    Probabilistic,

    /// Compare encounter-ratio-over-distance utilities of the local node and
    /// the neighbour
    ///
    /// Admits when the neighbour's utility is *lower* than the local one.
    /// Held back by the readiness gate. No ranking beyond discovery order.
    EncounterDistance,

    /// Partition neighbours into favorable and unfavorable clusters per
    /// message, then offer to every eligible neighbour
    ///
    /// The partition is reported for diagnostics only. Held back by the
    /// readiness gate.
    Cluster,

    /// Offer to neighbours whose encounter-ratio-over-normalized-distance
    /// beats the neighbourhood mean, or to every eligible neighbour when
    /// none does
    ///
    /// Held back by the readiness gate.
    NeighborhoodMean,

    /// Encounter/distance admission with predictability ranking
    ///
    /// Not held back by the readiness gate.
    Hybrid,
}

impl ForwardingStrategy {
    /// All strategies, in declaration order
    pub const ALL: [ForwardingStrategy; 5] = [
        ForwardingStrategy::Probabilistic,
        ForwardingStrategy::EncounterDistance,
        ForwardingStrategy::Cluster,
        ForwardingStrategy::NeighborhoodMean,
        ForwardingStrategy::Hybrid,
    ];

    /// Whether the strategy keeps a delivery-predictability table and needs
    /// one from every peer
    pub fn uses_predictability(&self) -> bool {
        matches!(
            self,
            ForwardingStrategy::Probabilistic | ForwardingStrategy::Hybrid
        )
    }

    /// Whether speculative forwarding waits for the readiness gate
    pub fn is_gated(&self) -> bool {
        matches!(
            self,
            ForwardingStrategy::EncounterDistance
                | ForwardingStrategy::Cluster
                | ForwardingStrategy::NeighborhoodMean
        )
    }

    /// Whether admitted candidates are sorted by neighbour predictability
    pub fn orders_by_predictability(&self) -> bool {
        self.uses_predictability()
    }

    /// Whether the strategy emits cluster diagnostics
    pub fn reports_clusters(&self) -> bool {
        matches!(self, ForwardingStrategy::Cluster)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardingStrategy::Probabilistic => "probabilistic",
            ForwardingStrategy::EncounterDistance => "encounter_distance",
            ForwardingStrategy::Cluster => "cluster",
            ForwardingStrategy::NeighborhoodMean => "neighborhood_mean",
            ForwardingStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ForwardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ForwardingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ForwardingStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("unknown forwarding strategy: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_probabilistic() {
        assert_eq!(ForwardingStrategy::default(), ForwardingStrategy::Probabilistic);
    }

    #[test]
    fn test_capabilities() {
        assert!(ForwardingStrategy::Probabilistic.uses_predictability());
        assert!(!ForwardingStrategy::Probabilistic.is_gated());

        assert!(ForwardingStrategy::EncounterDistance.is_gated());
        assert!(!ForwardingStrategy::EncounterDistance.orders_by_predictability());

        assert!(ForwardingStrategy::Cluster.is_gated());
        assert!(ForwardingStrategy::Cluster.reports_clusters());

        assert!(ForwardingStrategy::NeighborhoodMean.is_gated());

        assert!(!ForwardingStrategy::Hybrid.is_gated());
        assert!(ForwardingStrategy::Hybrid.orders_by_predictability());
    }

    #[test]
    fn test_display_and_parse_agree() {
        for strategy in ForwardingStrategy::ALL {
            let parsed: ForwardingStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("epidemic".parse::<ForwardingStrategy>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ForwardingStrategy::NeighborhoodMean).unwrap();
        assert_eq!(json, "\"neighborhood_mean\"");

        let parsed: ForwardingStrategy = serde_json::from_str("\"encounter_distance\"").unwrap();
        assert_eq!(parsed, ForwardingStrategy::EncounterDistance);
    }
}
