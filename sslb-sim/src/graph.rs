//! Undirected network graphs
//!
//! Generators for the wirings used by the simulator and a plain-text
//! edge-list dump for external graph tools.

use rand::Rng;
use sslb_core::NodeId;
use std::io::{self, Write};

/// Undirected graph stored as ordered adjacency lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<Vec<NodeId>>,
}

impl Graph {
    /// `n` nodes, no edges
    pub fn empty(n: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); n],
        }
    }

    /// Every pair of distinct nodes linked
    pub fn complete(n: usize) -> Self {
        let mut graph = Self::empty(n);
        for i in 0..n {
            for j in (i + 1)..n {
                graph.add_edge(i, j);
            }
        }
        graph
    }

    /// Node `i` linked to `i + 1`, wrapping around
    pub fn ring(n: usize) -> Self {
        let mut graph = Self::empty(n);
        if n > 1 {
            for i in 0..n {
                graph.add_edge(i, (i + 1) % n);
            }
        }
        graph
    }

    /// Erdős–Rényi G(n, p): each unordered pair is linked with
    /// probability `p`, pairs visited in `(i, j)`, `i < j` order.
    pub fn erdos_renyi<R: Rng + ?Sized>(n: usize, p: f64, rng: &mut R) -> Self {
        let mut graph = Self::empty(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if rng.gen::<f64>() < p {
                    graph.add_edge(i, j);
                }
            }
        }
        graph
    }

    /// Link `a` and `b` in both directions. Self-loops, duplicates and
    /// out-of-range ids are ignored.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        let n = self.adjacency.len();
        if a == b || a >= n || b >= n || self.adjacency[a].contains(&b) {
            return false;
        }
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        true
    }

    pub fn size(&self) -> usize {
        self.adjacency.len()
    }

    pub fn neighbors(&self, node: NodeId) -> Option<&[NodeId]> {
        self.adjacency.get(node).map(|v| v.as_slice())
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency.get(node).map_or(0, |v| v.len())
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|v| v.len()).sum::<usize>() / 2
    }

    /// Iterate `(node, neighbor)` over every adjacency entry
    pub fn links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(i, ns)| ns.iter().map(move |&j| (i, j)))
    }

    /// Node ids one per line, then one `i j` line per adjacency entry
    pub fn write_edge_list<W: Write>(&self, mut out: W) -> io::Result<()> {
        for i in 0..self.size() {
            writeln!(out, "{}", i)?;
        }
        for (i, j) in self.links() {
            writeln!(out, "{} {}", i, j)?;
        }
        Ok(())
    }
}
