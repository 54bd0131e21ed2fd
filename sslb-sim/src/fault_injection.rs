//! Fault injection for the simulated network
//!
//! Every message leaving a node passes through the injector, which decides
//! whether it is lost, how long it travels and whether an acknowledgment is
//! delivered twice:
//! - Message loss
//! - Message delays (which also reorder messages)
//! - Duplicated acknowledgments
//!
//! Proposals are never duplicated: a receiver has no way to tell a repeated
//! proposal from a fresh one.

use crate::event::Tick;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sslb_core::Message;

/// Fault injection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Probability of message loss (0.0-1.0)
    pub message_loss_rate: f64,
    /// Probability that an acknowledgment is delivered twice (0.0-1.0)
    pub duplicate_ack_rate: f64,
    /// Minimum delivery delay in ticks
    pub min_delay: Tick,
    /// Maximum delivery delay in ticks
    pub max_delay: Tick,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            message_loss_rate: 0.0,
            duplicate_ack_rate: 0.0,
            min_delay: 0,
            max_delay: 0,
        }
    }
}

impl FaultConfig {
    /// No faults (happy path)
    pub fn none() -> Self {
        Self::default()
    }

    /// 5% message loss
    pub fn lossy() -> Self {
        Self {
            message_loss_rate: 0.05,
            ..Default::default()
        }
    }

    /// Deliveries spread over several cycles (10-30 ticks)
    pub fn slow_network() -> Self {
        Self {
            min_delay: 10,
            max_delay: 30,
            ..Default::default()
        }
    }

    /// Short random delays that shuffle delivery order (0-8 ticks)
    pub fn reordering() -> Self {
        Self {
            min_delay: 0,
            max_delay: 8,
            ..Default::default()
        }
    }

    /// 10% of acknowledgments delivered twice
    pub fn stray_acks() -> Self {
        Self {
            duplicate_ack_rate: 0.10,
            ..Default::default()
        }
    }

    /// Whether load can be created or destroyed under this configuration
    pub fn is_lossless(&self) -> bool {
        self.message_loss_rate == 0.0 && self.duplicate_ack_rate == 0.0
    }

    pub fn delays_enabled(&self) -> bool {
        self.max_delay > 0
    }
}

/// Seeded fault injector
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(config: FaultConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Check if a message should be dropped
    pub fn should_drop_message(&mut self) -> bool {
        self.config.message_loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.message_loss_rate
    }

    /// Draw a delivery delay
    pub fn message_delay(&mut self) -> Tick {
        if self.config.min_delay >= self.config.max_delay {
            self.config.min_delay
        } else {
            self.rng.gen_range(self.config.min_delay..=self.config.max_delay)
        }
    }

    /// Delivery delays for one outgoing message: none when it is lost, two
    /// when an acknowledgment gets duplicated.
    pub fn deliveries(&mut self, message: &Message) -> Vec<Tick> {
        if self.should_drop_message() {
            return Vec::new();
        }

        let mut delays = vec![self.message_delay()];
        if matches!(message, Message::Ack { .. })
            && self.config.duplicate_ack_rate > 0.0
            && self.rng.gen::<f64>() < self.config.duplicate_ack_rate
        {
            delays.push(self.message_delay());
        }
        delays
    }
}
