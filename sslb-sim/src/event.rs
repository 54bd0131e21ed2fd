//! Events and priority queue for the discrete-event driver

use sslb_core::{Envelope, NodeId};
use std::cmp::Ordering;

/// Simulated time in ticks
pub type Tick = u64;

/// Something the driver has to do at a given tick
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Run the periodic phase of `node` for `cycle`
    Cycle { node: NodeId, cycle: u64 },
    /// Hand a message to its recipient
    Deliver(Envelope),
    /// Record load statistics at the end of `cycle`
    Observe { cycle: u64 },
}

/// An event with its due time and a sequence number.
///
/// Events due at the same tick run in scheduling order.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Tick,
    pub seq: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Tick, seq: u64, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Reversed so that BinaryHeap (a max-heap) pops the earliest event first
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
