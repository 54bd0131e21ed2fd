//! Predefined simulation scenarios
//!
//! A scenario fixes the faults, and optionally the wiring, initial loads and
//! node settings, on top of a base [`SimConfig`] supplied by the caller.

use crate::config::{LoadDistribution, SimConfig, TopologyKind};
use crate::fault_injection::FaultConfig;
use crate::metrics::{LoadStats, MessageCounters, Metrics};
use crate::simulator::{SimError, Simulation};
use sslb_core::{Load, NodeConfig};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from scenario execution
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimError),
}

/// Scenario configuration
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: String,
    pub faults: FaultConfig,
    pub topology: Option<TopologyKind>,
    pub initial: Option<LoadDistribution>,
    pub node: Option<NodeConfig>,
}

impl ScenarioConfig {
    fn new(name: &str, description: &str, faults: FaultConfig) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            faults,
            topology: None,
            initial: None,
            node: None,
        }
    }

    /// Overlay this scenario on `base`
    pub fn apply(&self, base: SimConfig) -> SimConfig {
        let mut config = base.with_faults(self.faults.clone());
        if let Some(topology) = &self.topology {
            config = config.with_topology(topology.clone());
        }
        if let Some(initial) = &self.initial {
            config = config.with_initial(initial.clone());
        }
        if let Some(node) = &self.node {
            config = config.with_node_config(node.clone());
        }
        config
    }
}

/// Scenario execution results
#[derive(Debug, Clone)]
pub struct ScenarioResults {
    pub scenario: String,
    pub nodes: usize,
    pub edges: usize,
    pub cycles: u64,
    pub initial_total: Load,
    /// Settled total once every in-flight message was delivered
    pub final_total: Load,
    pub conserved: bool,
    /// Whether the faults in play can break conservation
    pub lossless: bool,
    pub final_stats: Option<LoadStats>,
    pub counters: MessageCounters,
    pub duration_ms: u64,
    pub metrics: Metrics,
}

impl ScenarioResults {
    /// Deliver what is still in flight and collect the outcome of `sim`
    pub fn collect(
        scenario: &str,
        sim: &mut Simulation,
        started: Instant,
    ) -> Result<Self, ScenarioError> {
        sim.drain()?;

        let initial_total = sim.initial_total();
        let final_total = sim.total_settled_load();
        let lossless = sim.config().faults.is_lossless();
        let conserved = final_total == initial_total;
        if lossless && !conserved {
            warn!(
                "Scenario {}: load not conserved ({} -> {})",
                scenario, initial_total, final_total
            );
        }

        Ok(Self {
            scenario: scenario.to_string(),
            nodes: sim.graph().size(),
            edges: sim.graph().edge_count(),
            cycles: sim.cycles_run(),
            initial_total,
            final_total,
            conserved,
            lossless,
            final_stats: sim.metrics().last().copied(),
            counters: sim.metrics().counters,
            duration_ms: started.elapsed().as_millis() as u64,
            metrics: sim.metrics().clone(),
        })
    }
}

/// Get a predefined scenario by name
pub fn get_scenario(name: &str) -> Result<ScenarioConfig, ScenarioError> {
    match name.to_lowercase().as_str() {
        "happy" | "none" => Ok(ScenarioConfig::new(
            "happy",
            "No faults - baseline run",
            FaultConfig::none(),
        )),

        "lossy" | "message-loss" | "message_loss" => Ok(ScenarioConfig {
            node: Some(NodeConfig::default().with_round_timeout(5)),
            ..ScenarioConfig::new(
                "lossy",
                "5% message loss, stalled rounds abandoned after 5 cycles",
                FaultConfig::lossy(),
            )
        }),

        "reorder" => Ok(ScenarioConfig::new(
            "reorder",
            "Random delays within a cycle, deliveries reorder",
            FaultConfig::reordering(),
        )),

        "slow" | "slow-network" | "slow_network" => Ok(ScenarioConfig::new(
            "slow",
            "Deliveries take one to three cycles",
            FaultConfig::slow_network(),
        )),

        "stray-acks" | "stray_acks" => Ok(ScenarioConfig::new(
            "stray-acks",
            "10% of acknowledgments delivered twice",
            FaultConfig::stray_acks(),
        )),

        "peak" => Ok(ScenarioConfig {
            initial: Some(LoadDistribution::Peak { total: 10_000 }),
            ..ScenarioConfig::new("peak", "All load starts on node 0", FaultConfig::none())
        }),

        "ring" => Ok(ScenarioConfig {
            topology: Some(TopologyKind::Ring),
            initial: Some(LoadDistribution::Linear { min: 0, max: 1000 }),
            ..ScenarioConfig::new(
                "ring",
                "Linear load gradient around a ring",
                FaultConfig::none(),
            )
        }),

        _ => Err(ScenarioError::UnknownScenario(name.to_string())),
    }
}

/// Get all predefined scenario names
pub fn list_scenarios() -> Vec<&'static str> {
    vec!["happy", "lossy", "reorder", "slow", "stray-acks", "peak", "ring"]
}

/// Run a scenario on top of `base` for `base.cycles` cycles
pub fn run_scenario(
    scenario: &ScenarioConfig,
    base: SimConfig,
) -> Result<ScenarioResults, ScenarioError> {
    let started = Instant::now();
    let config = scenario.apply(base);
    info!(
        "Starting scenario: {} ({} nodes, {} cycles)",
        scenario.name, config.nodes, config.cycles
    );

    let cycles = config.cycles;
    let mut sim = Simulation::new(config)?;
    sim.run(cycles)?;

    let results = ScenarioResults::collect(&scenario.name, &mut sim, started)?;
    info!(
        "Scenario {} finished: MSE {:.6}, conserved {}",
        results.scenario,
        results.final_stats.map_or(0.0, |s| s.mse),
        results.conserved
    );
    Ok(results)
}
