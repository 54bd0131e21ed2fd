//! Per-node protocol state machine.
//!
//! A node runs two phases:
//! - Cycle phase (periodic): commit the last round, pick lighter
//!   neighbors, split an offer among them and send proposals.
//! - Message phase (on arrival): answer proposals with exactly one
//!   acknowledgment, and account acknowledgments against the open round.
//!
//! Committed `value` only changes at the start of a cycle. Everything a
//! round moves is accumulated in `last_received_load` / `last_gave_load`
//! and rolled into `value` by the next cycle.
//!
//! A node has at most one round of its own in flight. A cycle that starts
//! while acknowledgments are still missing sends nothing, since every
//! unanswered offer may still be accepted in full.

use crate::allocator::{allocate, Candidate};
use crate::config::NodeConfig;
use crate::error::Error;
use crate::topology::Topology;
use crate::transport::Transport;
use crate::types::{Context, Envelope, Load, Message, NodeId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Bookkeeping for one neighbor offered to in the open round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Total amount offered to the neighbor
    pub expected: Load,
    /// Proposals sent to the neighbor and not yet acknowledged
    pub outstanding: u32,
    /// Deals counted so far
    pub accepted: Load,
}

impl PendingTransfer {
    /// `true` once every proposal to this neighbor has been answered
    pub fn acknowledged(&self) -> bool {
        self.outstanding == 0
    }

    /// Offered load not yet covered by a counted deal
    pub fn remaining(&self) -> Load {
        self.expected - self.accepted
    }
}

/// Mutable protocol state owned by one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    value: Load,
    tentative_load: f64,
    last_received_load: Load,
    last_gave_load: Load,
    /// Pending acknowledgments and expected transfers of the open round,
    /// kept in one map so they are always cleared together
    round: BTreeMap<NodeId, PendingTransfer>,
    /// Cycle in which the open round sent its first proposal
    round_opened_at: Option<u64>,
}

impl NodeState {
    /// Fresh state holding `value` units of load
    pub fn new(value: Load) -> Self {
        Self {
            value,
            tentative_load: value as f64,
            last_received_load: 0,
            last_gave_load: 0,
            round: BTreeMap::new(),
            round_opened_at: None,
        }
    }

    pub fn value(&self) -> Load {
        self.value
    }

    pub fn tentative_load(&self) -> f64 {
        self.tentative_load
    }

    pub fn last_received_load(&self) -> Load {
        self.last_received_load
    }

    pub fn last_gave_load(&self) -> Load {
        self.last_gave_load
    }

    /// Committed value plus everything resolved since the last roll-forward
    pub fn settled_load(&self) -> Load {
        self.value + self.last_received_load - self.last_gave_load
    }

    /// Acknowledgment status of every neighbor offered to this round
    pub fn pending_acks(&self) -> impl Iterator<Item = (NodeId, bool)> + '_ {
        self.round.iter().map(|(id, p)| (*id, p.acknowledged()))
    }

    /// Amount offered to every neighbor this round
    pub fn expected_transfers(&self) -> impl Iterator<Item = (NodeId, Load)> + '_ {
        self.round.iter().map(|(id, p)| (*id, p.expected))
    }

    /// Bookkeeping for one neighbor, if it was offered to this round
    pub fn pending(&self, neighbor: NodeId) -> Option<&PendingTransfer> {
        self.round.get(&neighbor)
    }

    /// Whether a round is waiting for at least one acknowledgment
    pub fn round_open(&self) -> bool {
        self.round.values().any(|p| !p.acknowledged())
    }

    /// Number of acknowledgments the open round still waits for
    pub fn outstanding_acks(&self) -> u32 {
        self.round.values().map(|p| p.outstanding).sum()
    }

    /// Clear the round if every proposal has been answered.
    ///
    /// Safe to call any number of times; returns whether the round is
    /// (now) closed.
    pub fn try_close_round(&mut self) -> bool {
        if self.round_open() {
            return false;
        }
        self.round.clear();
        self.round_opened_at = None;
        true
    }

    fn roll_forward(&mut self) {
        self.value += self.last_received_load - self.last_gave_load;
        self.last_received_load = 0;
        self.last_gave_load = 0;
        self.tentative_load = self.value as f64;
    }

    fn record_offer(&mut self, neighbor: NodeId, amount: Load, cycle: u64) {
        let entry = self.round.entry(neighbor).or_default();
        entry.expected += amount;
        entry.outstanding += 1;
        self.round_opened_at.get_or_insert(cycle);
    }
}

/// What a cycle phase invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The node has no neighbors
    Isolated,
    /// No neighbor is light enough to take anything
    Balanced,
    /// The previous round still waits for acknowledgments; nothing offered
    AwaitingAcks { outstanding: u32 },
    /// Proposals were sent
    Proposed { offers: usize, load_to_transfer: Load },
}

/// What a message phase invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// A proposal was accepted for `deal` units
    Accepted { deal: Load },
    /// A proposal was declined (acknowledged with zero)
    Rejected,
    /// An acknowledgment was counted against the open round
    Acknowledged { deal: Load, round_complete: bool },
    /// An acknowledgment nobody was waiting for; ignored
    Stray,
}

/// A protocol participant: identity, configuration and owned state
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    state: NodeState,
}

impl Node {
    /// Create a node holding `initial_load` units
    pub fn new(id: NodeId, initial_load: Load, config: NodeConfig) -> Self {
        Self {
            id,
            config,
            state: NodeState::new(initial_load),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Committed load
    pub fn value(&self) -> Load {
        self.state.value
    }

    /// Periodic phase: commit the previous round and offer load to lighter
    /// neighbors.
    pub fn on_cycle<T, X>(
        &mut self,
        ctx: &Context,
        topology: &T,
        transport: &mut X,
    ) -> Result<CycleOutcome, Error>
    where
        T: Topology + ?Sized,
        X: Transport + ?Sized,
    {
        // Snapshot of neighbor loads, taken once for the whole cycle and
        // before any state changes
        let neighbors = topology
            .neighbors(self.id)
            .ok_or(Error::UnknownNode(self.id))?;
        let mut snapshot: Vec<(NodeId, Load)> = Vec::with_capacity(neighbors.len());
        for &q in neighbors {
            snapshot.push((q, topology.load_of(q).ok_or(Error::UnknownNode(q))?));
        }

        self.state.roll_forward();
        self.abandon_stalled_round(ctx);

        if snapshot.is_empty() {
            return Ok(CycleOutcome::Isolated);
        }

        if self.state.round_open() {
            let outstanding = self.state.outstanding_acks();
            debug!(
                "Node {}: cycle {} waiting for {} ACKs, no new proposals",
                self.id, ctx.cycle, outstanding
            );
            return Ok(CycleOutcome::AwaitingAcks { outstanding });
        }

        let value = self.state.value;
        let lighter: Vec<(NodeId, Load)> = snapshot
            .into_iter()
            .filter(|&(_, load)| load < value)
            .collect();

        let Some(min_load) = lighter.iter().map(|&(_, load)| load).min() else {
            return Ok(CycleOutcome::Balanced);
        };

        let tentative = self.state.tentative_load;
        let load_to_transfer = (((tentative - min_load as f64) / 2.0).ceil() as Load).max(0);
        let tentative_after_shed = tentative - load_to_transfer as f64;

        let candidates: Vec<Candidate> = lighter
            .iter()
            .filter(|&&(_, load)| (load as f64) < tentative_after_shed)
            .map(|&(q, load)| Candidate::new(q, load as f64))
            .collect();

        let offers = allocate(load_to_transfer, &candidates, tentative_after_shed);
        if offers.is_empty() {
            return Ok(CycleOutcome::Balanced);
        }

        debug!(
            "Node {}: cycle {} load {} min neighbor {} -> shedding {} (tentative {:.1})",
            self.id, ctx.cycle, self.state.value, min_load, load_to_transfer, tentative_after_shed
        );

        for offer in &offers {
            self.state.record_offer(offer.to, offer.amount, ctx.cycle);
            transport.send(Envelope::new(
                self.id,
                offer.to,
                Message::Proposal {
                    amount: offer.amount,
                    tentative_after_shed,
                    from: self.id,
                },
            ));
            debug!("Node {}: PROPOSAL {} -> {}", self.id, offer.amount, offer.to);
        }

        Ok(CycleOutcome::Proposed {
            offers: offers.len(),
            load_to_transfer,
        })
    }

    /// Event phase: handle one delivered message
    pub fn on_message<X>(&mut self, ctx: &Context, message: Message, transport: &mut X) -> MessageOutcome
    where
        X: Transport + ?Sized,
    {
        match message {
            Message::Proposal {
                amount,
                tentative_after_shed,
                from,
            } => self.handle_proposal(ctx, amount, tentative_after_shed, from, transport),
            Message::Ack { deal, from } => self.handle_ack(ctx, deal, from),
        }
    }

    fn handle_proposal<X>(
        &mut self,
        ctx: &Context,
        amount: Load,
        tentative_after_shed: f64,
        from: NodeId,
        transport: &mut X,
    ) -> MessageOutcome
    where
        X: Transport + ?Sized,
    {
        let amount = amount.max(0);
        let value = self.state.value;

        let deal = if tentative_after_shed > value as f64 {
            let headroom = (tentative_after_shed - value as f64).floor() as Load;
            amount.min(headroom).max(0)
        } else {
            0
        };

        transport.send(Envelope::new(
            self.id,
            from,
            Message::Ack {
                deal,
                from: self.id,
            },
        ));

        if tentative_after_shed > value as f64 {
            self.state.last_received_load += deal;
            self.state.tentative_load += deal as f64;
            debug!(
                "Node {}: cycle {} accepted {} of {} from {} (load {})",
                self.id, ctx.cycle, deal, amount, from, value
            );
            MessageOutcome::Accepted { deal }
        } else {
            debug!(
                "Node {}: cycle {} rejected proposal from {} (tentative {:.1} <= load {})",
                self.id, ctx.cycle, from, tentative_after_shed, value
            );
            MessageOutcome::Rejected
        }
    }

    fn handle_ack(&mut self, ctx: &Context, deal: Load, from: NodeId) -> MessageOutcome {
        let deal = deal.max(0);

        let Some(pending) = self.state.round.get_mut(&from).filter(|p| p.outstanding > 0) else {
            warn!(
                "Node {}: cycle {} ignoring stray ACK {} from {}",
                self.id, ctx.cycle, deal, from
            );
            return MessageOutcome::Stray;
        };

        // Never count more than was offered to this neighbor
        let counted = deal.min(pending.remaining());
        if counted < deal {
            warn!(
                "Node {}: cycle {} ACK {} from {} exceeds offer, counting {}",
                self.id, ctx.cycle, deal, from, counted
            );
        }
        pending.outstanding -= 1;
        pending.accepted += counted;
        let deal = counted;
        self.state.last_gave_load += deal;
        self.state.tentative_load -= deal as f64;

        let round_complete = self.state.try_close_round();
        debug!(
            "Node {}: cycle {} ACK {} from {} (gave {}, tentative {:.1}, complete {})",
            self.id,
            ctx.cycle,
            deal,
            from,
            self.state.last_gave_load,
            self.state.tentative_load,
            round_complete
        );

        MessageOutcome::Acknowledged {
            deal,
            round_complete,
        }
    }

    fn abandon_stalled_round(&mut self, ctx: &Context) {
        let (Some(limit), Some(opened)) = (self.config.round_timeout_cycles, self.state.round_opened_at)
        else {
            return;
        };

        if self.state.round_open() && ctx.cycle.saturating_sub(opened) >= limit {
            warn!(
                "Node {}: abandoning round from cycle {} with {} unanswered proposals",
                self.id,
                opened,
                self.state.outstanding_acks()
            );
            self.state.round.clear();
            self.state.round_opened_at = None;
        }
    }
}
