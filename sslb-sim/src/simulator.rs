//! Discrete-event driver for a network of load-balancing nodes
//!
//! Cycle `c` starts at tick `c * period`: every node runs its periodic
//! phase, in index order or shuffled. Messages go through the fault
//! injector and are delivered after their drawn delay. At tick
//! `(c + 1) * period` an observation records the load statistics of the
//! cycle. Messages still in flight at that point stay queued and are
//! delivered during later cycles.

use crate::config::{ConfigError, SimConfig};
use crate::event::{Event, ScheduledEvent, Tick};
use crate::fault_injection::FaultInjector;
use crate::graph::Graph;
use crate::metrics::{LoadStats, Metrics};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sslb_core::{Context, Envelope, Load, Message, Node, NodeId, Topology};
use std::collections::BinaryHeap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors from building or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] sslb_core::Error),
}

/// Topology seen by a node: graph adjacency plus committed loads
struct GraphView<'a> {
    graph: &'a Graph,
    loads: &'a [Load],
}

impl Topology for GraphView<'_> {
    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.graph.neighbors(node)
    }

    fn load_of(&self, node: NodeId) -> Option<Load> {
        self.loads.get(node).copied()
    }
}

/// A running simulation
pub struct Simulation {
    config: SimConfig,
    graph: Graph,
    nodes: Vec<Node>,
    /// Committed load of every node, refreshed after its periodic phase
    loads: Vec<Load>,
    queue: BinaryHeap<ScheduledEvent>,
    now: Tick,
    next_seq: u64,
    /// Next cycle to run
    cycle: u64,
    faults: FaultInjector,
    rng: StdRng,
    outbox: Vec<Envelope>,
    metrics: Metrics,
    initial_total: Load,
}

impl Simulation {
    /// Build the network described by `config`
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let graph = config.topology.build(config.nodes, &mut rng);
        let loads = config.initial.generate(config.nodes, &mut rng);
        Self::assemble(config, graph, loads, rng)
    }

    /// Run `config` over an explicit graph and initial loads. Topology and
    /// initial distribution settings in `config` are ignored.
    pub fn with_network(
        config: SimConfig,
        graph: Graph,
        loads: Vec<Load>,
    ) -> Result<Self, SimError> {
        if graph.size() == 0 {
            return Err(ConfigError::EmptyNetwork.into());
        }
        if loads.len() != graph.size() {
            return Err(ConfigError::LoadCountMismatch {
                expected: graph.size(),
                actual: loads.len(),
            }
            .into());
        }
        if loads.iter().any(|&l| l < 0) {
            return Err(ConfigError::NegativeLoad.into());
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Self::assemble(config, graph, loads, rng)
    }

    fn assemble(
        config: SimConfig,
        graph: Graph,
        loads: Vec<Load>,
        mut rng: StdRng,
    ) -> Result<Self, SimError> {
        if config.period == 0 {
            return Err(ConfigError::ZeroPeriod.into());
        }

        let faults = FaultInjector::new(config.faults.clone(), rng.gen());
        let nodes = loads
            .iter()
            .enumerate()
            .map(|(id, &load)| Node::new(id, load, config.node.clone()))
            .collect();
        let initial_total = loads.iter().sum();

        info!(
            "Simulation: {} nodes, {} edges, total load {}",
            graph.size(),
            graph.edge_count(),
            initial_total
        );

        Ok(Self {
            config,
            graph,
            nodes,
            loads,
            queue: BinaryHeap::new(),
            now: 0,
            next_seq: 0,
            cycle: 0,
            faults,
            rng,
            outbox: Vec::new(),
            metrics: Metrics::new(),
            initial_total,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Committed load of every node
    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of cycles run so far
    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Messages waiting for delivery
    pub fn in_flight(&self) -> usize {
        self.queue
            .iter()
            .filter(|e| matches!(e.event, Event::Deliver(_)))
            .count()
    }

    pub fn initial_total(&self) -> Load {
        self.initial_total
    }

    /// Sum of settled loads: committed value plus what the current round
    /// received minus what it gave
    pub fn total_settled_load(&self) -> Load {
        self.nodes.iter().map(|n| n.state().settled_load()).sum()
    }

    /// Load carried by acknowledgments not yet delivered. The receiver
    /// already counts it; the sender does not yet.
    pub fn in_flight_ack_load(&self) -> Load {
        self.queue
            .iter()
            .filter_map(|e| match &e.event {
                Event::Deliver(Envelope {
                    message: Message::Ack { deal, .. },
                    ..
                }) => Some((*deal).max(0)),
                _ => None,
            })
            .sum()
    }

    /// Whether no load was created or destroyed so far
    pub fn is_conserved(&self) -> bool {
        self.total_settled_load() - self.in_flight_ack_load() == self.initial_total
    }

    fn schedule(&mut self, time: Tick, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Run one cycle and return its load statistics
    pub fn run_cycle(&mut self) -> Result<LoadStats, SimError> {
        let cycle = self.cycle;
        self.cycle += 1;
        let start = cycle * self.config.period;

        let mut order: Vec<NodeId> = (0..self.nodes.len()).collect();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }
        for node in order {
            self.schedule(start, Event::Cycle { node, cycle });
        }
        self.schedule(start + self.config.period, Event::Observe { cycle });

        while let Some(scheduled) = self.queue.pop() {
            self.now = self.now.max(scheduled.time);
            if let Some(stats) = self.process_event(scheduled.event)? {
                if stats.cycle == cycle {
                    return Ok(stats);
                }
            }
        }

        // The observation is always queued, so the loop returns before this
        Ok(self.observe(cycle))
    }

    /// Run `cycles` cycles back to back
    pub fn run(&mut self, cycles: u64) -> Result<(), SimError> {
        for _ in 0..cycles {
            let stats = self.run_cycle()?;
            debug!(
                "Cycle {}: MSE {:.6} discrepancy {:.2}",
                stats.cycle, stats.mse, stats.discrepancy
            );
        }
        info!(
            "Ran {} cycles, {} messages in flight",
            cycles,
            self.in_flight()
        );
        Ok(())
    }

    /// Run `cycles` cycles, one per `period` of wall-clock time. Stops
    /// early on Ctrl-C.
    pub async fn run_paced(&mut self, period: Duration, cycles: u64) -> Result<(), SimError> {
        let mut ticker = tokio::time::interval(period);
        for _ in 0..cycles {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.run_cycle()?;
                    info!(
                        "Cycle {}: MSE {:.6} discrepancy {:.2}",
                        stats.cycle, stats.mse, stats.discrepancy
                    );
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted after {} cycles", self.cycle);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Deliver every queued message, and whatever those deliveries send,
    /// without starting new cycles. Returns the number of deliveries.
    pub fn drain(&mut self) -> Result<usize, SimError> {
        let mut delivered = 0;
        while let Some(scheduled) = self.queue.pop() {
            self.now = self.now.max(scheduled.time);
            if matches!(scheduled.event, Event::Deliver(_)) {
                delivered += 1;
            }
            self.process_event(scheduled.event)?;
        }
        debug!("Drained {} deliveries", delivered);
        Ok(delivered)
    }

    fn process_event(&mut self, event: Event) -> Result<Option<LoadStats>, SimError> {
        match event {
            Event::Cycle { node, cycle } => {
                self.fire_cycle(node, cycle)?;
                Ok(None)
            }
            Event::Deliver(envelope) => {
                self.deliver(envelope)?;
                Ok(None)
            }
            Event::Observe { cycle } => Ok(Some(self.observe(cycle))),
        }
    }

    fn fire_cycle(&mut self, id: NodeId, cycle: u64) -> Result<(), SimError> {
        let ctx = Context::new(cycle);
        let view = GraphView {
            graph: &self.graph,
            loads: &self.loads,
        };
        let node = self
            .nodes
            .get_mut(id)
            .ok_or(sslb_core::Error::UnknownNode(id))?;

        let outcome = node.on_cycle(&ctx, &view, &mut self.outbox)?;
        self.loads[id] = node.value();
        self.metrics.count_cycle(&outcome);
        trace!("Node {}: cycle {} -> {:?}", id, cycle, outcome);

        self.route_outbox();
        Ok(())
    }

    fn deliver(&mut self, envelope: Envelope) -> Result<(), SimError> {
        let ctx = Context::new(self.now / self.config.period);
        let to = envelope.to;
        let node = self
            .nodes
            .get_mut(to)
            .ok_or(sslb_core::Error::UnknownNode(to))?;

        let outcome = node.on_message(&ctx, envelope.message, &mut self.outbox);
        self.metrics.count_message(&outcome);

        self.route_outbox();
        Ok(())
    }

    /// Pass freshly sent messages through the fault injector into the queue
    fn route_outbox(&mut self) {
        let now = self.now;
        for envelope in std::mem::take(&mut self.outbox) {
            self.metrics.count_sent(&envelope.message);

            let delays = self.faults.deliveries(&envelope.message);
            match delays.len() {
                0 => {
                    self.metrics.counters.dropped += 1;
                    trace!(
                        "Dropped {} {} -> {}",
                        envelope.message.kind(),
                        envelope.from,
                        envelope.to
                    );
                    continue;
                }
                1 => {}
                _ => self.metrics.counters.duplicated += 1,
            }

            for delay in delays {
                self.schedule(now + delay, Event::Deliver(envelope.clone()));
            }
        }
    }

    fn observe(&mut self, cycle: u64) -> LoadStats {
        let stats = LoadStats::compute(cycle, &self.graph, &self.loads);
        self.metrics.record(stats);
        stats
    }
}
