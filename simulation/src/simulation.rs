//! Discrete-time replay of a scenario
//!
//! Each step:
//! - Advance the clock to the step time
//! - Apply every timeline entry due by then (injections, contacts), telling
//!   both endpoints of a contact, `a` first
//! - Tick every node's policy in address order and apply the accepted
//!   transfer, if any

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ferry_core::{ContactEvent, ManualClock, MessageId, NodeId, SimTime};
use ferry_logging::NodeContextGuard;
use ferry_routing::{ContactOutcome, ForwardingStrategy, PredictabilitySnapshot, TickOutcome};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::error::SimulationResult;
use crate::scenario::{Injection, Scenario};
use crate::world::{Arrival, InstantScheduler, TraceWorld};

/// One timeline entry
#[derive(Debug, Clone)]
enum TimelineEntry {
    Inject(Injection),
    Contact(ContactEvent),
}

impl TimelineEntry {
    fn at(&self) -> SimTime {
        match self {
            TimelineEntry::Inject(injection) => injection.at,
            TimelineEntry::Contact(event) => event.at,
        }
    }
}

/// Counters for a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub contacts: u64,
    pub injected: u64,
    /// Candidates handed to the scheduler
    pub offered: u64,
    /// Copies stored at intermediate nodes
    pub relayed: u64,
    /// Messages that reached their destination
    pub delivered: u64,
    pub duplicate_deliveries: u64,
    pub gated_ticks: u64,
    pub skipped_ticks: u64,
    /// Sum over delivered messages of (delivery time - injection time)
    pub total_delivery_latency: f64,
}

impl RunStats {
    /// Delivered messages as a share of injected ones
    pub fn delivery_ratio(&self) -> f64 {
        if self.injected == 0 {
            0.0
        } else {
            self.delivered as f64 / self.injected as f64
        }
    }

    pub fn average_latency(&self) -> Option<f64> {
        (self.delivered > 0).then(|| self.total_delivery_latency / self.delivered as f64)
    }

    fn record_tick(&mut self, outcome: &TickOutcome) {
        if let Some(report) = outcome.report() {
            self.offered += report.offered() as u64;
        }
        match outcome {
            TickOutcome::Gated => self.gated_ticks += 1,
            TickOutcome::Skipped(_) => self.skipped_ticks += 1,
            _ => {}
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Steps:      {}", self.steps)?;
        writeln!(f, "Contacts:   {}", self.contacts)?;
        writeln!(f, "Injected:   {}", self.injected)?;
        writeln!(f, "Offered:    {}", self.offered)?;
        writeln!(f, "Relayed:    {}", self.relayed)?;
        writeln!(
            f,
            "Delivered:  {} ({:.1}%)",
            self.delivered,
            self.delivery_ratio() * 100.0
        )?;
        if self.duplicate_deliveries > 0 {
            writeln!(f, "Duplicates: {}", self.duplicate_deliveries)?;
        }
        writeln!(f, "Gated:      {} tick(s)", self.gated_ticks)?;
        match self.average_latency() {
            Some(latency) => write!(f, "Latency:    {latency:.1}s average"),
            None => write!(f, "Latency:    n/a"),
        }
    }
}

/// A scenario being replayed
pub struct Simulation {
    name: String,
    strategy: ForwardingStrategy,
    world: TraceWorld,
    clock: Arc<ManualClock>,
    timeline: Vec<TimelineEntry>,
    next_entry: usize,
    tick_step: f64,
    end_time: SimTime,
    step_index: u64,
    injected_at: HashMap<MessageId, SimTime>,
    pub stats: RunStats,
}

impl Simulation {
    /// Validate the scenario and build its world
    pub fn new(scenario: Scenario) -> SimulationResult<Self> {
        scenario.validate()?;

        let clock = Arc::new(ManualClock::default());
        let world = TraceWorld::new(scenario.nodes.clone(), &scenario.forwarding, clock.clone())?;
        let end_time = scenario.end_time();

        let mut timeline: Vec<TimelineEntry> = scenario
            .messages
            .into_iter()
            .map(TimelineEntry::Inject)
            .chain(scenario.contacts.into_iter().map(TimelineEntry::Contact))
            .collect();
        // Stable: injections before contacts at equal times, file order otherwise
        timeline.sort_by(|a, b| a.at().total_cmp(&b.at()));

        Ok(Self {
            name: scenario.name,
            strategy: scenario.forwarding.strategy,
            world,
            clock,
            timeline,
            next_entry: 0,
            tick_step: scenario.tick_step,
            end_time,
            step_index: 0,
            injected_at: HashMap::new(),
            stats: RunStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn world(&self) -> &TraceWorld {
        &self.world
    }

    pub fn now(&self) -> SimTime {
        self.step_index as f64 * self.tick_step
    }

    pub fn is_finished(&self) -> bool {
        self.now() > self.end_time
    }

    /// Replay until the end time
    pub fn run(&mut self) -> SimulationResult<&RunStats> {
        let span = info_span!("run", scenario = %self.name, strategy = %self.strategy);
        let _enter = span.enter();
        info!(end_time = self.end_time, tick_step = self.tick_step, "Replay started");

        while !self.is_finished() {
            self.step()?;
        }

        info!(
            delivered = self.stats.delivered,
            relayed = self.stats.relayed,
            offered = self.stats.offered,
            "Replay finished"
        );
        Ok(&self.stats)
    }

    /// Run a single step
    pub fn step(&mut self) -> SimulationResult<()> {
        let now = self.now();

        while let Some(entry) = self.timeline.get(self.next_entry).cloned() {
            if entry.at() > now {
                break;
            }
            self.next_entry += 1;
            self.clock.set(entry.at());
            match entry {
                TimelineEntry::Inject(injection) => self.inject(injection),
                TimelineEntry::Contact(event) => self.contact(&event)?,
            }
        }

        self.clock.set(now);
        self.world.clear_busy();

        for node in NodeId::range(self.world.policies().len()) {
            let _ctx = NodeContextGuard::with_run(node, self.name.as_str());
            let buffer = self.world.buffer(node).to_vec();
            let connections = self.world.connections_of(node);
            let mut scheduler = InstantScheduler::default();

            let outcome = self.world.policies()[node.index()].tick(
                &self.world,
                &buffer,
                &connections,
                &mut scheduler,
            )?;
            self.stats.record_tick(&outcome);

            if let Some(candidate) = scheduler.take_accepted() {
                match self.world.transfer(node, &candidate, now) {
                    Arrival::Delivered => {
                        self.stats.delivered += 1;
                        if let Some(at) = self.injected_at.get(&candidate.message.id) {
                            self.stats.total_delivery_latency += now - at;
                        }
                    }
                    Arrival::Duplicate => self.stats.duplicate_deliveries += 1,
                    Arrival::Relayed => self.stats.relayed += 1,
                }
            }
        }

        self.stats.steps += 1;
        self.step_index += 1;
        Ok(())
    }

    fn inject(&mut self, injection: Injection) {
        self.injected_at.insert(injection.id.clone(), injection.at);
        self.world.inject(injection.message());
        self.stats.injected += 1;
    }

    fn contact(&mut self, event: &ContactEvent) -> SimulationResult<()> {
        self.world.apply_contact(event);
        if !event.up {
            return Ok(());
        }
        self.stats.contacts += 1;

        for node in [event.a, event.b] {
            let _ctx = NodeContextGuard::with_run(node, self.name.as_str());
            let Some(policy) = self.world.policy(node) else {
                warn!(%node, "Contact with a node outside the world");
                continue;
            };
            if let ContactOutcome::Recorded { peer, kind, .. } = policy.on_contact(event, &self.world)? {
                debug!(%node, %peer, ?kind, "Encounter recorded");
            }
        }
        Ok(())
    }

    /// Predictability tables of every node that keeps one
    pub fn snapshots(&self) -> Vec<PredictabilitySnapshot> {
        self.world
            .policies()
            .iter()
            .filter_map(|p| p.snapshot())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::{Location, PeerView};
    use ferry_routing::ForwardingConfig;

    use super::*;

    fn run(scenario: Scenario) -> Simulation {
        let mut sim = Simulation::new(scenario).unwrap();
        sim.run().unwrap();
        sim
    }

    #[test]
    fn test_demo_delivers_through_courier() {
        let sim = run(Scenario::demo());

        assert_eq!(sim.stats.injected, 1);
        assert_eq!(sim.stats.relayed, 1);
        assert_eq!(sim.stats.delivered, 1);
        assert_eq!(sim.stats.duplicate_deliveries, 0);
        // Injected at 0, handed to n1 at 30, delivered at 60
        assert_eq!(sim.stats.average_latency(), Some(60.0));
        assert!(sim.world().has_message(NodeId(1), &MessageId::from("M1")));
        assert_eq!(sim.world().delivered_at(&MessageId::from("M1")), Some(60.0));
        assert!(sim.is_finished());
    }

    #[test]
    fn test_demo_step_count_and_contacts() {
        let sim = run(Scenario::demo());
        // Steps at 0, 10, ..., 80
        assert_eq!(sim.stats.steps, 9);
        assert_eq!(sim.stats.contacts, 6);
        assert_eq!(sim.world().live_connections(), 0);
    }

    #[test]
    fn test_gated_strategy_waits_for_ledger() {
        let sim = run(Scenario::demo().with_strategy(ForwardingStrategy::EncounterDistance));

        // Six nodes and six pairs met leave far too many zero cells
        let tracker = sim.world().tracker().unwrap();
        assert!(!sim.world().policies()[0].gate().is_started());
        assert!(tracker.zero_cells() > 9);
        assert!(sim.stats.gated_ticks > 0);
        assert_eq!(sim.stats.relayed, 0);
        assert_eq!(sim.stats.delivered, 0);
    }

    #[test]
    fn test_direct_contact_delivers_without_relays() {
        let scenario = Scenario {
            name: "direct".to_string(),
            nodes: vec![Location::new(0.0, 0.0), Location::new(5.0, 0.0)],
            contacts: vec![ContactEvent::up(NodeId(0), NodeId(1), 15.0)],
            messages: vec![Injection::new("M1", NodeId(0), NodeId(1), 0.0)],
            forwarding: ForwardingConfig::cluster(30),
            tick_step: 10.0,
            end_time: Some(30.0),
        };
        let sim = run(scenario);

        // Gated strategies still hand messages to their destination
        assert_eq!(sim.stats.delivered, 1);
        assert_eq!(sim.stats.relayed, 0);
        assert_eq!(sim.stats.average_latency(), Some(20.0));
    }

    #[test]
    fn test_snapshots_follow_strategy() {
        let sim = run(Scenario::demo());
        let snapshots = sim.snapshots();
        assert_eq!(snapshots.len(), 6);
        assert!(snapshots[1].get(NodeId(5)).unwrap() > 0.0);

        let sim = run(Scenario::demo().with_strategy(ForwardingStrategy::Cluster));
        assert!(sim.snapshots().is_empty());
    }

    #[test]
    fn test_invalid_forwarding_config_fails_setup() {
        let mut scenario = Scenario::demo();
        scenario.forwarding.seconds_in_time_unit = Some(0);
        assert!(Simulation::new(scenario).is_err());
    }

    #[test]
    fn test_stats_display() {
        let stats = RunStats {
            injected: 4,
            delivered: 1,
            total_delivery_latency: 42.0,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Delivered:  1 (25.0%)"));
        assert!(text.contains("42.0s average"));
        assert!(RunStats::default().to_string().contains("n/a"));
    }
}
