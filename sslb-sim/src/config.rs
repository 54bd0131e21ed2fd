//! Simulation configuration
//!
//! Everything needed to reproduce a run: network size and wiring, initial
//! loads, pacing, faults and per-node protocol settings. Loadable from a
//! JSON file; missing fields take their defaults.

use crate::event::Tick;
use crate::fault_injection::FaultConfig;
use crate::graph::Graph;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sslb_core::{Load, NodeConfig};
use std::path::Path;
use thiserror::Error;

/// Errors from loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Network must have at least one node")]
    EmptyNetwork,

    #[error("Edge probability {0} outside [0, 1]")]
    InvalidProbability(f64),

    #[error("Invalid range: min {min} > max {max}")]
    InvalidRange { min: i64, max: i64 },

    #[error("Initial loads must be non-negative")]
    NegativeLoad,

    #[error("Expected {expected} initial loads, got {actual}")]
    LoadCountMismatch { expected: usize, actual: usize },

    #[error("Cycle period must be at least one tick")]
    ZeroPeriod,

    #[error("Fault rate {0} outside [0, 1]")]
    InvalidRate(f64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// How nodes are wired together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyKind {
    Complete,
    Ring,
    ErdosRenyi { p: f64 },
}

impl TopologyKind {
    pub fn build<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Graph {
        match self {
            TopologyKind::Complete => Graph::complete(n),
            TopologyKind::Ring => Graph::ring(n),
            TopologyKind::ErdosRenyi { p } => Graph::erdos_renyi(n, *p, rng),
        }
    }
}

/// Initial load assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadDistribution {
    /// Independent uniform draws from `[min, max]`
    Uniform { min: Load, max: Load },
    /// Evenly spaced from `min` at node 0 to `max` at the last node
    Linear { min: Load, max: Load },
    /// Everything on node 0
    Peak { total: Load },
    /// Explicit per-node loads
    Fixed { loads: Vec<Load> },
}

impl LoadDistribution {
    pub fn generate<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Load> {
        match self {
            LoadDistribution::Uniform { min, max } => {
                (0..n).map(|_| rng.gen_range(*min..=*max)).collect()
            }
            LoadDistribution::Linear { min, max } => {
                if n <= 1 {
                    return vec![*min; n];
                }
                let span = max - min;
                (0..n)
                    .map(|i| min + span * i as Load / (n - 1) as Load)
                    .collect()
            }
            LoadDistribution::Peak { total } => {
                let mut loads = vec![0; n];
                if let Some(first) = loads.first_mut() {
                    *first = *total;
                }
                loads
            }
            LoadDistribution::Fixed { loads } => loads.clone(),
        }
    }
}

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of nodes
    pub nodes: usize,
    /// Cycles to run
    pub cycles: u64,
    /// Seed for wiring, initial loads, faults and ordering
    pub seed: u64,
    pub topology: TopologyKind,
    pub initial: LoadDistribution,
    /// Ticks per cycle
    pub period: Tick,
    /// Run nodes in a fresh random order every cycle
    pub shuffle: bool,
    pub faults: FaultConfig,
    pub node: NodeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 100,
            cycles: 50,
            seed: 42,
            topology: TopologyKind::ErdosRenyi { p: 0.1 },
            initial: LoadDistribution::Uniform { min: 0, max: 100 },
            period: 10,
            shuffle: false,
            faults: FaultConfig::none(),
            node: NodeConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_cycles(mut self, cycles: u64) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_initial(mut self, initial: LoadDistribution) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_period(mut self, period: Tick) -> Self {
        self.period = period;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_node_config(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }

    /// Check the configuration for values no run can use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::EmptyNetwork);
        }
        if self.period == 0 {
            return Err(ConfigError::ZeroPeriod);
        }

        if let TopologyKind::ErdosRenyi { p } = self.topology {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidProbability(p));
            }
        }

        match &self.initial {
            LoadDistribution::Uniform { min, max } | LoadDistribution::Linear { min, max } => {
                if min > max {
                    return Err(ConfigError::InvalidRange {
                        min: *min,
                        max: *max,
                    });
                }
                if *min < 0 {
                    return Err(ConfigError::NegativeLoad);
                }
            }
            LoadDistribution::Peak { total } => {
                if *total < 0 {
                    return Err(ConfigError::NegativeLoad);
                }
            }
            LoadDistribution::Fixed { loads } => {
                if loads.len() != self.nodes {
                    return Err(ConfigError::LoadCountMismatch {
                        expected: self.nodes,
                        actual: loads.len(),
                    });
                }
                if loads.iter().any(|&l| l < 0) {
                    return Err(ConfigError::NegativeLoad);
                }
            }
        }

        for rate in [self.faults.message_loss_rate, self.faults.duplicate_ack_rate] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidRate(rate));
            }
        }
        if self.faults.min_delay > self.faults.max_delay {
            return Err(ConfigError::InvalidRange {
                min: self.faults.min_delay as i64,
                max: self.faults.max_delay as i64,
            });
        }

        Ok(())
    }
}
