//! Property tests for the node protocol driven over a small network
//!
//! Messages are delivered in an arbitrary order chosen by proptest.
//! - Conservation: settled load minus load carried by in-flight ACKs is
//!   constant, at every step
//! - Non-negativity: committed, tentative and settled loads stay >= 0,
//!   also when cycles fire before the previous round is answered
//! - Closure: once every message is delivered no round is left open

use proptest::prelude::*;
use sslb_core::{Context, Envelope, Load, Message, Node, NodeConfig, NodeId, Topology};

// ============================================================================
// Test network
// ============================================================================

struct Network {
    adjacency: Vec<Vec<NodeId>>,
    nodes: Vec<Node>,
    loads: Vec<Load>,
    in_flight: Vec<Envelope>,
}

/// Topology view over a snapshot of committed loads
struct View<'a> {
    adjacency: &'a [Vec<NodeId>],
    loads: &'a [Load],
}

impl Topology for View<'_> {
    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.adjacency.get(node).map(|v| v.as_slice())
    }

    fn load_of(&self, node: NodeId) -> Option<Load> {
        self.loads.get(node).copied()
    }
}

impl Network {
    fn new(loads: &[Load], edges: &[bool]) -> Self {
        let n = loads.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut k = 0;
        for i in 0..n {
            for j in (i + 1)..n {
                if edges.get(k).copied().unwrap_or(true) {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
                k += 1;
            }
        }
        let nodes = loads
            .iter()
            .enumerate()
            .map(|(i, &l)| Node::new(i, l, NodeConfig::default()))
            .collect();

        Self {
            adjacency,
            nodes,
            loads: loads.to_vec(),
            in_flight: Vec::new(),
        }
    }

    fn cycle(&mut self, cycle: u64) {
        let ctx = Context::new(cycle);
        for i in 0..self.nodes.len() {
            let view = View {
                adjacency: &self.adjacency,
                loads: &self.loads,
            };
            self.nodes[i]
                .on_cycle(&ctx, &view, &mut self.in_flight)
                .unwrap();
            self.loads[i] = self.nodes[i].value();
        }
    }

    /// Deliver the in-flight message picked by `choice`
    fn deliver_one(&mut self, cycle: u64, choice: usize) {
        let envelope = self.in_flight.swap_remove(choice % self.in_flight.len());
        let ctx = Context::new(cycle);
        self.nodes[envelope.to].on_message(&ctx, envelope.message, &mut self.in_flight);
    }

    fn settled(&self) -> Load {
        self.nodes.iter().map(|n| n.state().settled_load()).sum()
    }

    fn assert_non_negative(&self) -> Result<(), TestCaseError> {
        for node in &self.nodes {
            prop_assert!(node.value() >= 0, "node {} value {}", node.id(), node.value());
            prop_assert!(
                node.state().tentative_load() >= 0.0,
                "node {} tentative {}",
                node.id(),
                node.state().tentative_load()
            );
            prop_assert!(node.state().settled_load() >= 0);
        }
        Ok(())
    }

    fn in_flight_acks(&self) -> Load {
        self.in_flight
            .iter()
            .map(|e| match e.message {
                Message::Ack { deal, .. } => deal,
                Message::Proposal { .. } => 0,
            })
            .sum()
    }
}

// ============================================================================
// Strategies
// ============================================================================

fn initial_loads() -> impl Strategy<Value = Vec<Load>> {
    prop::collection::vec(0i64..100, 2..8)
}

fn edge_mask() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.7), 0..28)
}

fn delivery_order() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(any::<usize>(), 0..400)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// CORE INVARIANT: total load is conserved across fully resolved rounds
    #[test]
    fn load_conserved_when_rounds_resolve(
        loads in initial_loads(),
        edges in edge_mask(),
        order in delivery_order(),
        cycles in 1u64..8,
    ) {
        let total: Load = loads.iter().sum();
        let mut net = Network::new(&loads, &edges);
        let mut picks = order.into_iter().chain(std::iter::repeat(0));

        for cycle in 0..cycles {
            net.cycle(cycle);
            while !net.in_flight.is_empty() {
                net.deliver_one(cycle, picks.next().unwrap_or(0));
                prop_assert_eq!(net.settled() - net.in_flight_acks(), total);
            }

            prop_assert_eq!(net.settled(), total);
            net.assert_non_negative()?;
            for node in &net.nodes {
                prop_assert!(!node.state().round_open(), "node {} left a round open", node.id());
            }
        }
    }

    /// Cycles may fire before the previous round is answered; every ACK is
    /// still counted exactly once and no node gives away more than it holds
    #[test]
    fn load_conserved_when_cycles_outpace_acks(
        loads in initial_loads(),
        edges in edge_mask(),
        order in delivery_order(),
        per_cycle in 0usize..6,
        cycles in 1u64..8,
    ) {
        let total: Load = loads.iter().sum();
        let mut net = Network::new(&loads, &edges);
        let mut picks = order.into_iter().chain(std::iter::repeat(0));

        for cycle in 0..cycles {
            net.cycle(cycle);
            net.assert_non_negative()?;
            for _ in 0..per_cycle {
                if net.in_flight.is_empty() {
                    break;
                }
                net.deliver_one(cycle, picks.next().unwrap_or(0));
                prop_assert_eq!(net.settled() - net.in_flight_acks(), total);
                net.assert_non_negative()?;
            }
        }

        while !net.in_flight.is_empty() {
            net.deliver_one(cycles, picks.next().unwrap_or(0));
            net.assert_non_negative()?;
        }
        prop_assert_eq!(net.settled(), total);
        for node in &net.nodes {
            prop_assert!(!node.state().round_open());
        }
    }

    /// Every proposal is answered by exactly one ACK to its sender
    #[test]
    fn one_ack_per_proposal(
        loads in initial_loads(),
        edges in edge_mask(),
    ) {
        let mut net = Network::new(&loads, &edges);
        net.cycle(0);

        let proposals: Vec<Envelope> = net.in_flight.drain(..).collect();
        for envelope in &proposals {
            let mut replies = Vec::new();
            net.nodes[envelope.to].on_message(&Context::new(0), envelope.message.clone(), &mut replies);

            prop_assert_eq!(replies.len(), 1);
            prop_assert_eq!(replies[0].to, envelope.from);
            match (&envelope.message, &replies[0].message) {
                (Message::Proposal { amount, .. }, Message::Ack { deal, .. }) => {
                    prop_assert!(*deal >= 0 && deal <= amount);
                }
                other => prop_assert!(false, "unexpected exchange {:?}", other),
            }
        }
    }
}

#[test]
fn balanced_network_stays_quiet() {
    let mut net = Network::new(&[5, 5, 5, 5], &[]);
    net.cycle(0);
    assert!(net.in_flight.is_empty());
}

#[test]
fn repeated_cycles_before_delivery_stay_non_negative() {
    let mut net = Network::new(&[10, 0], &[]);
    for cycle in 0..3 {
        net.cycle(cycle);
    }
    assert_eq!(net.in_flight.len(), 1);

    while !net.in_flight.is_empty() {
        net.deliver_one(3, 0);
    }
    net.cycle(4);

    assert_eq!(net.nodes[0].value(), 5);
    assert_eq!(net.nodes[0].state().tentative_load(), 5.0);
    assert_eq!(net.nodes[1].value(), 5);
}

#[test]
fn full_exchange_reaches_balance_on_complete_graph() {
    let mut net = Network::new(&[40, 0, 0, 0], &[]);
    for cycle in 0..30 {
        net.cycle(cycle);
        while !net.in_flight.is_empty() {
            net.deliver_one(cycle, 0);
        }
    }
    net.cycle(30);

    let max = net.nodes.iter().map(|n| n.value()).max().unwrap();
    let min = net.nodes.iter().map(|n| n.value()).min().unwrap();
    assert!(max - min <= 1, "loads still spread: {:?}", net.loads);
    assert_eq!(net.nodes.iter().map(|n| n.value()).sum::<Load>(), 40);
}
