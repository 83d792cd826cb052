//! Per-node forwarding orchestration
//!
//! A [`ForwardingPolicy`] drives one node. It reacts to contact events by
//! updating the shared ledger, the readiness gate and (for predictability
//! strategies) its own predictability table. On every tick it builds the
//! candidate list for the node's live connections and buffered messages and
//! hands it to the transfer scheduler.
//!
//! A tick runs in this order:
//! 1. Skip when the node is transferring, has nothing buffered, or has no
//!    live connection
//! 2. Offer messages to neighbours that are their final recipient; any
//!    accepted transfer ends the tick
//! 3. Stop if the strategy is gated and the gate is still closed
//! 4. Admit strategy candidates and rank them
//! 5. Offer the ranked list to the scheduler

use std::sync::Arc;

use ferry_core::{
    Candidate, Clock, Connection, ContactEvent, DeliveryEstimate, Message, MessageId,
    NodeDirectory, NodeError, NodeId, PeerView, PolicyId, SimTime, TransferOutcome,
    TransferScheduler,
};
use tracing::{debug, trace, warn};

use crate::cluster::{ClusterLabel, ClusterReport, partition};
use crate::contact::{ContactTracker, EncounterKind};
use crate::error::{ForwardingError, ForwardingResult};
use crate::prophet::{PredictabilitySnapshot, PredictabilityStore};
use crate::readiness::ReadinessGate;
use crate::strategy::ForwardingStrategy;
use crate::utility::UtilityEstimator;
use crate::ForwardingConfig;

/// What a contact event changed
#[derive(Debug, Clone, PartialEq)]
pub enum ContactOutcome {
    /// Connection-down events carry no information for the engine
    Ignored,
    Recorded {
        peer: NodeId,
        kind: EncounterKind,
        /// Whether this contact opened the readiness gate
        gate_opened: bool,
        /// Predictability for `peer` after the contact, for predictability strategies
        predictability: Option<f64>,
        /// Entries updated through the peer's table
        transitive_updates: usize,
    },
}

/// Why a tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The local node is mid-transfer
    Transferring,
    EmptyBuffer,
    NoConnections,
}

/// Candidates offered to the scheduler and what it made of them
#[derive(Debug, Clone, PartialEq)]
pub struct OfferReport {
    pub candidates: Vec<Candidate>,
    /// Positional; may be shorter than `candidates`
    pub outcomes: Vec<TransferOutcome>,
}

impl OfferReport {
    pub fn offered(&self) -> usize {
        self.candidates.len()
    }

    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_accepted()).count()
    }

    /// Outcome for the candidate at `index`; unreported candidates count as rejected
    pub fn outcome(&self, index: usize) -> TransferOutcome {
        self.outcomes
            .get(index)
            .copied()
            .unwrap_or(TransferOutcome::Rejected)
    }

    /// Accepted candidates, in offer order
    pub fn accepted_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .zip(&self.outcomes)
            .filter(|(_, o)| o.is_accepted())
            .map(|(c, _)| c)
    }
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// At least one message was handed to its final recipient
    Delivered(OfferReport),
    /// Strategy candidates were offered
    Offered {
        report: OfferReport,
        /// Per-message neighbour partitions, for the cluster strategy
        clusters: Vec<(MessageId, ClusterReport)>,
    },
    /// Nothing was admitted
    Idle,
    /// The readiness gate is closed and no direct delivery went through
    Gated,
}

impl TickOutcome {
    /// The report of whatever was offered last, if anything
    pub fn report(&self) -> Option<&OfferReport> {
        match self {
            TickOutcome::Delivered(report) | TickOutcome::Offered { report, .. } => Some(report),
            _ => None,
        }
    }
}

type Link = (Connection, NodeId);

/// Forwarding decisions for a single node
pub struct ForwardingPolicy {
    id: PolicyId,
    local: NodeId,
    config: ForwardingConfig,
    tracker: Arc<ContactTracker>,
    gate: Arc<ReadinessGate>,
    clock: Arc<dyn Clock>,
    predictability: Option<PredictabilityStore>,
}

impl ForwardingPolicy {
    /// Create the policy for `local`
    ///
    /// `tracker` and `gate` must be the instances shared by every node in the
    /// node set.
    pub fn new(
        local: NodeId,
        config: ForwardingConfig,
        tracker: Arc<ContactTracker>,
        gate: Arc<ReadinessGate>,
        clock: Arc<dyn Clock>,
    ) -> ForwardingResult<Self> {
        let warnings = config.validate()?;
        for warning in &warnings {
            warn!(node = %local, %warning, "Questionable forwarding configuration");
        }

        if local.index() >= tracker.node_count() {
            return Err(NodeError::OutOfRange {
                node: local,
                node_count: tracker.node_count(),
            }
            .into());
        }

        if gate.zero_threshold() != config.zero_threshold {
            warn!(
                node = %local,
                configured = config.zero_threshold,
                shared = gate.zero_threshold(),
                "Shared readiness gate uses a different zero threshold"
            );
        }

        let predictability = if config.strategy.uses_predictability() {
            Some(PredictabilityStore::new(local, config.prophet_config()?))
        } else {
            None
        };

        let id = PolicyId::next();
        debug!(node = %local, policy = %id, strategy = %config.strategy, "Created forwarding policy");

        Ok(Self {
            id,
            local,
            config,
            tracker,
            gate,
            clock,
            predictability,
        })
    }

    /// Identity of this policy instance
    pub fn id(&self) -> PolicyId {
        self.id
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    pub fn strategy(&self) -> ForwardingStrategy {
        self.config.strategy
    }

    pub fn tracker(&self) -> &Arc<ContactTracker> {
        &self.tracker
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// This node's predictability table, for peers that read it
    pub fn delivery_estimate(&self) -> Option<&PredictabilityStore> {
        self.predictability.as_ref()
    }

    /// Diagnostic copy of the predictability table at the current time
    pub fn snapshot(&self) -> Option<PredictabilitySnapshot> {
        self.predictability
            .as_ref()
            .map(|store| store.snapshot(self.clock.now()))
    }

    /// React to a connection coming up or going down
    ///
    /// For predictability strategies the peer's table is resolved before
    /// anything is mutated, so a peer without one leaves every piece of
    /// state untouched.
    pub fn on_contact<E>(&self, event: &ContactEvent, env: &E) -> ForwardingResult<ContactOutcome>
    where
        E: PeerView + ?Sized,
    {
        if event.a == event.b {
            warn!(node = %self.local, endpoint = %event.a, "Contact event connects a node to itself");
            return Err(ForwardingError::SelfContact {
                node: event.a,
                at: event.at,
            });
        }

        let Some(peer) = event.connection().other(self.local) else {
            warn!(node = %self.local, a = %event.a, b = %event.b, "Contact event for another node");
            return Err(ForwardingError::NotParticipant {
                local: self.local,
                a: event.a,
                b: event.b,
            });
        };

        if !event.up {
            trace!(node = %self.local, %peer, at = event.at, "Connection down");
            return Ok(ContactOutcome::Ignored);
        }

        let now = self.clock.now();
        let peer_estimate = if self.config.strategy.uses_predictability() {
            Some(self.require_estimate(env, peer)?)
        } else {
            None
        };

        let kind = if env.policy_id(peer) == Some(self.id) {
            EncounterKind::Mutual
        } else {
            EncounterKind::Directed
        };
        self.tracker.record_encounter(self.local, peer, kind)?;
        let gate_opened = self.gate.observe(&self.tracker);

        let (predictability, transitive_updates) =
            match (self.predictability.as_ref(), peer_estimate) {
                (Some(store), Some(estimate)) => {
                    let p = store.record_contact(peer, now);
                    let peer_table = estimate.delivery_table(now);
                    let updated = store.propagate_transitive(peer, &peer_table, now);
                    (Some(p), updated)
                }
                _ => (None, 0),
            };

        debug!(
            node = %self.local,
            %peer,
            ?kind,
            gate_opened,
            ?predictability,
            transitive_updates,
            "Contact recorded"
        );

        Ok(ContactOutcome::Recorded {
            peer,
            kind,
            gate_opened,
            predictability,
            transitive_updates,
        })
    }

    /// Run one forwarding pass
    pub fn tick<E, S>(
        &self,
        env: &E,
        buffer: &[Message],
        connections: &[Connection],
        scheduler: &mut S,
    ) -> ForwardingResult<TickOutcome>
    where
        E: PeerView + NodeDirectory + ?Sized,
        S: TransferScheduler + ?Sized,
    {
        let span = tracing::debug_span!("tick", node = %self.local, strategy = %self.config.strategy);
        let _enter = span.enter();

        if env.is_transferring(self.local) {
            return Ok(TickOutcome::Skipped(SkipReason::Transferring));
        }
        if buffer.is_empty() {
            return Ok(TickOutcome::Skipped(SkipReason::EmptyBuffer));
        }

        let links: Vec<Link> = connections
            .iter()
            .filter(|c| c.up)
            .filter_map(|c| c.other(self.local).map(|peer| (*c, peer)))
            .collect();
        if links.is_empty() {
            return Ok(TickOutcome::Skipped(SkipReason::NoConnections));
        }

        let now = self.clock.now();
        let open: Vec<Link> = links
            .iter()
            .copied()
            .filter(|(_, peer)| !env.is_transferring(*peer))
            .collect();

        let direct = self.direct_candidates(env, buffer, &open);
        if !direct.is_empty() {
            let report = self.offer(scheduler, direct);
            if report.accepted() > 0 {
                debug!(offered = report.offered(), accepted = report.accepted(), "Direct delivery");
                return Ok(TickOutcome::Delivered(report));
            }
        }

        if self.config.strategy.is_gated() && !self.gate.is_started() {
            trace!("Readiness gate closed");
            return Ok(TickOutcome::Gated);
        }

        let mut clusters = Vec::new();
        let mut candidates = match self.config.strategy {
            ForwardingStrategy::Probabilistic => {
                self.probabilistic_candidates(env, buffer, &open, now)?
            }
            ForwardingStrategy::EncounterDistance => {
                self.encounter_distance_candidates(env, buffer, &open)?
            }
            ForwardingStrategy::Cluster => {
                self.cluster_candidates(env, buffer, &links, &open, &mut clusters)?
            }
            ForwardingStrategy::NeighborhoodMean => {
                self.neighborhood_candidates(env, buffer, &links, &open)?
            }
            ForwardingStrategy::Hybrid => self.hybrid_candidates(env, buffer, &open, now)?,
        };

        if candidates.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        if self.config.strategy.orders_by_predictability() {
            let mode = self.config.queue_mode;
            candidates.sort_by(|a, b| {
                b.utility
                    .total_cmp(&a.utility)
                    .then_with(|| mode.compare(&a.message, &b.message))
            });
        }

        let report = self.offer(scheduler, candidates);
        debug!(offered = report.offered(), accepted = report.accepted(), "Offered candidates");
        Ok(TickOutcome::Offered { report, clusters })
    }

    fn require_estimate<'e, E>(
        &self,
        env: &'e E,
        peer: NodeId,
    ) -> ForwardingResult<&'e dyn DeliveryEstimate>
    where
        E: PeerView + ?Sized,
    {
        env.delivery_estimate(peer)
            .ok_or(ForwardingError::ProtocolMismatch {
                peer,
                strategy: self.config.strategy,
            })
    }

    fn is_eligible<E>(&self, env: &E, message: &Message, peer: NodeId) -> bool
    where
        E: PeerView + ?Sized,
    {
        // Accepted offers are not tracked: a transfer that aborts, or a copy the
        // peer later drops, makes the message eligible again
        !env.has_message(peer, &message.id)
    }

    fn direct_candidates<E>(&self, env: &E, buffer: &[Message], open: &[Link]) -> Vec<Candidate>
    where
        E: PeerView + ?Sized,
    {
        let mut direct: Vec<Candidate> = open
            .iter()
            .flat_map(|(conn, peer)| {
                buffer
                    .iter()
                    .filter(move |m| m.is_for(*peer))
                    .filter(move |m| self.is_eligible(env, m, *peer))
                    .map(move |m| Candidate::new(m.clone(), *conn, *peer, 1.0))
            })
            .collect();

        let mode = self.config.queue_mode;
        direct.sort_by(|a, b| mode.compare(&a.message, &b.message));
        direct
    }

    /// Relay candidates: eligible messages not destined to the neighbour itself
    fn relayable<'m, E>(
        &self,
        env: &E,
        buffer: &'m [Message],
        peer: NodeId,
    ) -> impl Iterator<Item = &'m Message>
    where
        E: PeerView + ?Sized,
    {
        buffer
            .iter()
            .filter(move |m| !m.is_for(peer) && self.is_eligible(env, m, peer))
    }

    fn probabilistic_candidates<E>(
        &self,
        env: &E,
        buffer: &[Message],
        open: &[Link],
        now: SimTime,
    ) -> ForwardingResult<Vec<Candidate>>
    where
        E: PeerView + ?Sized,
    {
        let estimates = open
            .iter()
            .map(|(_, peer)| self.require_estimate(env, *peer))
            .collect::<ForwardingResult<Vec<_>>>()?;
        let Some(store) = self.predictability.as_ref() else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        for ((conn, peer), estimate) in open.iter().zip(estimates) {
            for m in self.relayable(env, buffer, *peer) {
                let theirs = estimate.predictability(m.destination, now);
                let ours = store.predictability(m.destination, now);
                if theirs > ours {
                    trace!(message = %m.id, %peer, theirs, ours, "Admitted");
                    candidates.push(Candidate::new(m.clone(), *conn, *peer, theirs));
                }
            }
        }
        Ok(candidates)
    }

    fn encounter_distance_candidates<E>(
        &self,
        env: &E,
        buffer: &[Message],
        open: &[Link],
    ) -> ForwardingResult<Vec<Candidate>>
    where
        E: PeerView + NodeDirectory + ?Sized,
    {
        let estimator = UtilityEstimator::new(&self.tracker, env);

        let mut candidates = Vec::new();
        for (conn, peer) in open {
            for m in self.relayable(env, buffer, *peer) {
                let ours = estimator.encounter_distance(m.destination, self.local)?;
                let theirs = estimator.encounter_distance(m.destination, *peer)?;
                // Admits when the local node scores higher than the neighbour
                if theirs < ours {
                    trace!(message = %m.id, %peer, theirs, ours, "Admitted");
                    candidates.push(Candidate::new(m.clone(), *conn, *peer, theirs));
                }
            }
        }
        Ok(candidates)
    }

    fn cluster_candidates<E>(
        &self,
        env: &E,
        buffer: &[Message],
        links: &[Link],
        open: &[Link],
        clusters: &mut Vec<(MessageId, ClusterReport)>,
    ) -> ForwardingResult<Vec<Candidate>>
    where
        E: PeerView + NodeDirectory + ?Sized,
    {
        let estimator = UtilityEstimator::new(&self.tracker, env);
        let neighbors: Vec<NodeId> = links.iter().map(|(_, peer)| *peer).collect();

        let mut candidates = Vec::new();
        for m in buffer {
            let features = estimator.cluster_features(m.destination, &neighbors)?;
            let Some(report) = partition(&features) else {
                continue;
            };

            for (conn, peer) in open {
                if m.is_for(*peer) || !self.is_eligible(env, m, *peer) {
                    continue;
                }
                let label = report.label(*peer);
                trace!(message = %m.id, %peer, ?label, "Flooding");
                let utility = if label == Some(ClusterLabel::Favorable) {
                    1.0
                } else {
                    0.0
                };
                candidates.push(Candidate::new(m.clone(), *conn, *peer, utility));
            }
            clusters.push((m.id.clone(), report));
        }
        Ok(candidates)
    }

    fn neighborhood_candidates<E>(
        &self,
        env: &E,
        buffer: &[Message],
        links: &[Link],
        open: &[Link],
    ) -> ForwardingResult<Vec<Candidate>>
    where
        E: PeerView + NodeDirectory + ?Sized,
    {
        let estimator = UtilityEstimator::new(&self.tracker, env);

        let mut candidates = Vec::new();
        for m in buffer {
            // Every live neighbour counts toward the mean, busy or not
            let gammas = links
                .iter()
                .map(|(_, peer)| -> ForwardingResult<(NodeId, f64)> {
                    Ok((*peer, estimator.neighborhood_gamma(m.destination, *peer)?))
                })
                .collect::<ForwardingResult<Vec<_>>>()?;
            let threshold = gammas.iter().map(|(_, g)| g).sum::<f64>() / gammas.len() as f64;
            let gamma_of = |peer: NodeId| {
                gammas
                    .iter()
                    .find(|(p, _)| *p == peer)
                    .map(|(_, g)| *g)
                    .unwrap_or(0.0)
            };
            let any_better = gammas.iter().any(|(_, g)| *g > threshold);

            for (conn, peer) in open {
                if m.is_for(*peer) || !self.is_eligible(env, m, *peer) {
                    continue;
                }
                let gamma = gamma_of(*peer);
                if !any_better || gamma > threshold {
                    trace!(message = %m.id, %peer, gamma, threshold, "Admitted");
                    candidates.push(Candidate::new(m.clone(), *conn, *peer, gamma));
                }
            }
        }
        Ok(candidates)
    }

    fn hybrid_candidates<E>(
        &self,
        env: &E,
        buffer: &[Message],
        open: &[Link],
        now: SimTime,
    ) -> ForwardingResult<Vec<Candidate>>
    where
        E: PeerView + NodeDirectory + ?Sized,
    {
        let estimates = open
            .iter()
            .map(|(_, peer)| self.require_estimate(env, *peer))
            .collect::<ForwardingResult<Vec<_>>>()?;
        let estimator = UtilityEstimator::new(&self.tracker, env);

        let mut candidates = Vec::new();
        for ((conn, peer), estimate) in open.iter().zip(estimates) {
            for m in self.relayable(env, buffer, *peer) {
                let ours = estimator.encounter_distance(m.destination, self.local)?;
                let theirs = estimator.encounter_distance(m.destination, *peer)?;
                if theirs < ours {
                    let rank = estimate.predictability(m.destination, now);
                    trace!(message = %m.id, %peer, theirs, ours, rank, "Admitted");
                    candidates.push(Candidate::new(m.clone(), *conn, *peer, rank));
                }
            }
        }
        Ok(candidates)
    }

    fn offer<S>(&self, scheduler: &mut S, candidates: Vec<Candidate>) -> OfferReport
    where
        S: TransferScheduler + ?Sized,
    {
        let outcomes = scheduler.offer(&candidates);
        let report = OfferReport {
            candidates,
            outcomes,
        };
        for candidate in report.accepted_candidates() {
            debug!(message = %candidate.message.id, peer = %candidate.peer, "Hand-off accepted");
        }
        report
    }
}

impl std::fmt::Debug for ForwardingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingPolicy")
            .field("id", &self.id)
            .field("local", &self.local)
            .field("strategy", &self.config.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use ferry_core::{Location, ManualClock};

    use super::*;

    const UNIT: i64 = 30;

    /// Single-node harness: one policy under test, peers modelled as plain
    /// predictability stores
    struct Env {
        locations: Vec<Location>,
        peers: HashMap<NodeId, PredictabilityStore>,
        held: HashSet<(NodeId, MessageId)>,
        busy: HashSet<NodeId>,
    }

    impl Env {
        fn new(count: usize) -> Self {
            Self {
                locations: (0..count)
                    .map(|i| Location::new(i as f64 * 10.0, 0.0))
                    .collect(),
                peers: HashMap::new(),
                held: HashSet::new(),
                busy: HashSet::new(),
            }
        }

        fn with_peer_store(mut self, peer: u32) -> Self {
            let config = ForwardingConfig::probabilistic(UNIT).prophet_config().unwrap();
            self.peers
                .insert(NodeId(peer), PredictabilityStore::new(NodeId(peer), config));
            self
        }
    }

    impl NodeDirectory for Env {
        fn node_count(&self) -> usize {
            self.locations.len()
        }

        fn location(&self, node: NodeId) -> Option<Location> {
            self.locations.get(node.index()).copied()
        }
    }

    impl PeerView for Env {
        fn policy_id(&self, _node: NodeId) -> Option<PolicyId> {
            None
        }

        fn is_transferring(&self, node: NodeId) -> bool {
            self.busy.contains(&node)
        }

        fn has_message(&self, node: NodeId, message: &MessageId) -> bool {
            self.held.contains(&(node, message.clone()))
        }

        fn delivery_estimate(&self, node: NodeId) -> Option<&dyn DeliveryEstimate> {
            self.peers.get(&node).map(|s| s as &dyn DeliveryEstimate)
        }
    }

    /// Accepts everything and remembers what it saw
    #[derive(Default)]
    struct Recorder {
        seen: Vec<Vec<Candidate>>,
        accept: bool,
    }

    impl TransferScheduler for Recorder {
        fn offer(&mut self, candidates: &[Candidate]) -> Vec<TransferOutcome> {
            self.seen.push(candidates.to_vec());
            let outcome = if self.accept {
                TransferOutcome::Accepted
            } else {
                TransferOutcome::Rejected
            };
            vec![outcome; candidates.len()]
        }
    }

    fn policy(
        local: u32,
        config: ForwardingConfig,
        nodes: usize,
    ) -> (ForwardingPolicy, Arc<ManualClock>) {
        let tracker = Arc::new(ContactTracker::new(nodes));
        let gate = Arc::new(config.readiness_gate());
        let clock = Arc::new(ManualClock::default());
        let policy =
            ForwardingPolicy::new(NodeId(local), config, tracker, gate, clock.clone()).unwrap();
        (policy, clock)
    }

    fn link(a: u32, b: u32) -> Connection {
        Connection::up(NodeId(a), NodeId(b))
    }

    #[test]
    fn test_invalid_config_halts_setup() {
        let tracker = Arc::new(ContactTracker::new(2));
        let gate = Arc::new(ReadinessGate::default());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());

        let err = ForwardingPolicy::new(
            NodeId(0),
            ForwardingConfig::default(),
            tracker.clone(),
            gate.clone(),
            clock.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, ForwardingError::Config(_)));

        let err = ForwardingPolicy::new(
            NodeId(5),
            ForwardingConfig::probabilistic(UNIT),
            tracker,
            gate,
            clock,
        )
        .unwrap_err();
        assert!(matches!(err, ForwardingError::Node(_)));
    }

    #[test]
    fn test_policy_ids_are_distinct() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 2);
        let (b, _) = policy(1, ForwardingConfig::probabilistic(UNIT), 2);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_first_contact_then_aging() {
        let (a, clock) = policy(0, ForwardingConfig::probabilistic(UNIT), 2);
        let env = Env::new(2).with_peer_store(1);

        let outcome = a
            .on_contact(&ContactEvent::up(NodeId(0), NodeId(1), 0.0), &env)
            .unwrap();
        assert!(matches!(
            outcome,
            ContactOutcome::Recorded {
                kind: EncounterKind::Directed,
                predictability: Some(p),
                ..
            } if p == 0.75
        ));

        clock.set(UNIT as f64);
        let snap = a.snapshot().unwrap();
        assert!((snap.get(NodeId(1)).unwrap() - 0.735).abs() < 1e-12);
    }

    #[test]
    fn test_down_event_is_ignored() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 2);
        let env = Env::new(2);
        let outcome = a
            .on_contact(&ContactEvent::down(NodeId(0), NodeId(1), 0.0), &env)
            .unwrap();
        assert_eq!(outcome, ContactOutcome::Ignored);
        assert_eq!(a.tracker().total_encounters(), 0);
    }

    #[test]
    fn test_foreign_event_rejected() {
        let (a, _) = policy(0, ForwardingConfig::encounter_distance(UNIT), 3);
        let err = a
            .on_contact(&ContactEvent::up(NodeId(1), NodeId(2), 0.0), &Env::new(3))
            .unwrap_err();
        assert!(matches!(err, ForwardingError::NotParticipant { .. }));
    }

    #[test]
    fn test_self_contact_rejected_before_any_update() {
        for config in [
            ForwardingConfig::probabilistic(UNIT),
            ForwardingConfig::encounter_distance(UNIT),
        ] {
            let (a, _) = policy(0, config, 2);
            let env = Env::new(2).with_peer_store(0);
            let err = a
                .on_contact(&ContactEvent::up(NodeId(0), NodeId(0), 4.0), &env)
                .unwrap_err();
            assert_eq!(
                err,
                ForwardingError::SelfContact {
                    node: NodeId(0),
                    at: 4.0
                }
            );
            assert_eq!(a.tracker().count(NodeId(0), NodeId(0)), 0);
            assert_eq!(a.tracker().total_encounters(), 0);
        }
    }

    #[test]
    fn test_protocol_mismatch_leaves_state_untouched() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 2);
        // Peer 1 keeps no predictability table
        let env = Env::new(2);

        let err = a
            .on_contact(&ContactEvent::up(NodeId(0), NodeId(1), 0.0), &env)
            .unwrap_err();
        assert_eq!(
            err,
            ForwardingError::ProtocolMismatch {
                peer: NodeId(1),
                strategy: ForwardingStrategy::Probabilistic
            }
        );
        assert_eq!(a.tracker().total_encounters(), 0);
        assert_eq!(a.delivery_estimate().unwrap().known_targets(), 0);
    }

    #[test]
    fn test_tick_skips() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 2);
        let mut env = Env::new(2).with_peer_store(1);
        let mut scheduler = Recorder::default();
        let msg = Message::new("M1", NodeId(0), NodeId(1));

        let outcome = a.tick(&env, &[], &[link(0, 1)], &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::EmptyBuffer));

        let down = Connection::down(NodeId(0), NodeId(1));
        let outcome = a.tick(&env, &[msg.clone()], &[down], &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::NoConnections));

        env.busy.insert(NodeId(0));
        let outcome = a.tick(&env, &[msg], &[link(0, 1)], &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Skipped(SkipReason::Transferring));
        assert!(scheduler.seen.is_empty());
    }

    #[test]
    fn test_direct_delivery_ends_tick() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 3);
        let mut env = Env::new(3).with_peer_store(1).with_peer_store(2);
        let mut scheduler = Recorder {
            accept: true,
            ..Default::default()
        };
        let buffer = vec![
            Message::new("M1", NodeId(0), NodeId(1)),
            Message::new("M2", NodeId(0), NodeId(2)),
        ];
        let connections = [link(0, 1)];

        let outcome = a.tick(&env, &buffer, &connections, &mut scheduler).unwrap();
        let TickOutcome::Delivered(report) = outcome else {
            panic!("expected direct delivery, got {outcome:?}");
        };
        assert_eq!(report.offered(), 1);
        assert_eq!(report.candidates[0].message.id.as_str(), "M1");

        // Once n1 holds M1 nothing is left to offer; M2 has no better carrier
        env.held.insert((NodeId(1), MessageId::from("M1")));
        let outcome = a.tick(&env, &buffer, &connections, &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(scheduler.seen.len(), 1);
    }

    #[test]
    fn test_gate_blocks_speculative_forwarding() {
        let (a, _) = policy(0, ForwardingConfig::encounter_distance(UNIT), 3);
        let env = Env::new(3);
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(2))];

        let outcome = a.tick(&env, &buffer, &[link(0, 1)], &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Gated);
        assert!(scheduler.seen.is_empty());
    }

    #[test]
    fn test_probabilistic_admission_and_order() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 4);
        let env = Env::new(4).with_peer_store(1).with_peer_store(2);
        // n1 has met n3 twice, n2 once; n0 never
        env.peers[&NodeId(1)].record_contact(NodeId(3), 0.0);
        env.peers[&NodeId(1)].record_contact(NodeId(3), 0.0);
        env.peers[&NodeId(2)].record_contact(NodeId(3), 0.0);

        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(3))];
        let outcome = a
            .tick(&env, &buffer, &[link(0, 2), link(0, 1)], &mut scheduler)
            .unwrap();

        let report = outcome.report().unwrap();
        let peers: Vec<NodeId> = report.candidates.iter().map(|c| c.peer).collect();
        assert_eq!(peers, vec![NodeId(1), NodeId(2)]);
        assert!(report.candidates[0].utility > report.candidates[1].utility);
        assert_eq!(report.accepted(), 0);
    }

    #[test]
    fn test_accepted_relay_reoffered_until_peer_holds_it() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 3);
        let mut env = Env::new(3).with_peer_store(1);
        env.peers[&NodeId(1)].record_contact(NodeId(2), 0.0);
        let mut scheduler = Recorder {
            accept: true,
            ..Default::default()
        };
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(2))];
        let connections = [link(0, 1)];

        let outcome = a.tick(&env, &buffer, &connections, &mut scheduler).unwrap();
        assert_eq!(outcome.report().map(|r| r.accepted()), Some(1));

        // The transfer aborted: n1 never stored M1, so it is offered again
        let outcome = a.tick(&env, &buffer, &connections, &mut scheduler).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.offered(), 1);
        assert_eq!(report.candidates[0].peer, NodeId(1));
        assert_eq!(report.candidates[0].message.id.as_str(), "M1");

        env.held.insert((NodeId(1), MessageId::from("M1")));
        let outcome = a.tick(&env, &buffer, &connections, &mut scheduler).unwrap();
        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(scheduler.seen.len(), 2);
    }

    #[test]
    fn test_equal_scores_follow_queue_mode() {
        for (mode, expected) in [
            (ferry_core::QueueMode::Fifo, ["M2", "M1"]),
            (ferry_core::QueueMode::Lifo, ["M1", "M2"]),
        ] {
            let config = ForwardingConfig::probabilistic(UNIT).with_queue_mode(mode);
            let (a, _) = policy(0, config, 3);
            let env = Env::new(3).with_peer_store(1);
            env.peers[&NodeId(1)].record_contact(NodeId(2), 0.0);

            let buffer = vec![
                Message::new("M1", NodeId(0), NodeId(2)).received_at(5.0),
                Message::new("M2", NodeId(0), NodeId(2)).received_at(1.0),
            ];
            let mut scheduler = Recorder::default();
            let outcome = a.tick(&env, &buffer, &[link(0, 1)], &mut scheduler).unwrap();

            let ids: Vec<&str> = outcome
                .report()
                .unwrap()
                .candidates
                .iter()
                .map(|c| c.message.id.as_str())
                .collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn test_held_messages_and_busy_peers_are_skipped() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 4);
        let mut env = Env::new(4).with_peer_store(1).with_peer_store(2);
        env.peers[&NodeId(1)].record_contact(NodeId(3), 0.0);
        env.peers[&NodeId(2)].record_contact(NodeId(3), 0.0);
        env.held.insert((NodeId(1), MessageId::from("M1")));
        env.busy.insert(NodeId(2));

        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(3))];
        let outcome = a
            .tick(&env, &buffer, &[link(0, 1), link(0, 2)], &mut scheduler)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Idle);
    }

    #[test]
    fn test_tick_protocol_mismatch() {
        let (a, _) = policy(0, ForwardingConfig::probabilistic(UNIT), 3);
        let env = Env::new(3);
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(2))];

        let err = a.tick(&env, &buffer, &[link(0, 1)], &mut scheduler).unwrap_err();
        assert!(matches!(err, ForwardingError::ProtocolMismatch { .. }));
    }

    #[test]
    fn test_encounter_distance_literal_admission() {
        // Nodes on a line, 10 apart: n0 at 0, n1 at 10, n2 at 20, n3 at 30
        let config = ForwardingConfig::encounter_distance(UNIT).with_zero_threshold(1.0);
        let (a, _) = policy(0, config, 4);
        let env = Env::new(4);

        // n3 (destination) met n0 once and n1 three times
        let tracker = a.tracker();
        tracker
            .record_encounter(NodeId(3), NodeId(0), EncounterKind::Directed)
            .unwrap();
        for _ in 0..3 {
            tracker
                .record_encounter(NodeId(3), NodeId(1), EncounterKind::Directed)
                .unwrap();
        }
        assert!(a.gate().observe(tracker));

        // ours = 0.25 / 30, n1 = 0.75 / 20, n2 = 0 / 10
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(3))];
        let outcome = a
            .tick(&env, &buffer, &[link(0, 1), link(0, 2)], &mut scheduler)
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.offered(), 1);
        assert_eq!(report.candidates[0].peer, NodeId(2));
    }

    #[test]
    fn test_cluster_floods_with_diagnostics() {
        let config = ForwardingConfig::cluster(UNIT).with_zero_threshold(1.0);
        let (a, _) = policy(0, config, 5);
        a.tracker()
            .record_encounter(NodeId(1), NodeId(4), EncounterKind::Directed)
            .unwrap();
        a.gate().observe(a.tracker());

        let env = Env::new(5);
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(4))];
        let outcome = a
            .tick(
                &env,
                &buffer,
                &[link(0, 1), link(0, 2), link(0, 3)],
                &mut scheduler,
            )
            .unwrap();

        let TickOutcome::Offered { report, clusters } = outcome else {
            panic!("expected flood, got {outcome:?}");
        };
        assert_eq!(report.offered(), 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].1.label(NodeId(3)), Some(ClusterLabel::Favorable));
        assert_eq!(clusters[0].1.label(NodeId(1)), Some(ClusterLabel::Unfavorable));
    }

    #[test]
    fn test_neighborhood_mean_prefers_above_average() {
        let config = ForwardingConfig::for_strategy(ForwardingStrategy::NeighborhoodMean, UNIT)
            .with_zero_threshold(1.0);
        let (a, _) = policy(0, config, 4);
        a.tracker()
            .record_encounter(NodeId(3), NodeId(2), EncounterKind::Directed)
            .unwrap();
        a.gate().observe(a.tracker());

        let env = Env::new(4);
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(3))];
        let outcome = a
            .tick(&env, &buffer, &[link(0, 1), link(0, 2)], &mut scheduler)
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.offered(), 1);
        assert_eq!(report.candidates[0].peer, NodeId(2));
    }

    #[test]
    fn test_neighborhood_mean_floods_without_history() {
        let config = ForwardingConfig::for_strategy(ForwardingStrategy::NeighborhoodMean, UNIT)
            .with_zero_threshold(1.0);
        let (a, _) = policy(0, config, 4);
        a.tracker()
            .record_encounter(NodeId(0), NodeId(0), EncounterKind::Directed)
            .unwrap();
        a.gate().observe(a.tracker());

        let env = Env::new(4);
        let mut scheduler = Recorder::default();
        let buffer = vec![Message::new("M1", NodeId(0), NodeId(3))];
        let outcome = a
            .tick(&env, &buffer, &[link(0, 1), link(0, 2)], &mut scheduler)
            .unwrap();
        assert_eq!(outcome.report().unwrap().offered(), 2);
    }
}
