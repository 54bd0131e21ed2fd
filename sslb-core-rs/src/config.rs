//! Per-node protocol configuration

use serde::{Deserialize, Serialize};

/// Node configuration, handed to [`crate::Node::new`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Abandon a round still waiting for acknowledgments after this many
    /// cycles. `None` keeps it open until every acknowledgment arrives.
    pub round_timeout_cycles: Option<u64>,
}

impl NodeConfig {
    /// Abandon stalled rounds after `cycles` cycles
    pub fn with_round_timeout(mut self, cycles: u64) -> Self {
        self.round_timeout_cycles = Some(cycles);
        self
    }

    /// Keep stalled rounds open indefinitely
    pub fn without_round_timeout(mut self) -> Self {
        self.round_timeout_cycles = None;
        self
    }
}
