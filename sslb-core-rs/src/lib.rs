//! Self-stabilizing load balancing protocol core
//!
//! Each node holds an integer load and periodically offers part of it to
//! lighter neighbors through a two-phase PROPOSAL/ACK handshake. Nodes
//! never share state: the topology and transport are supplied by the
//! caller at every phase invocation.

pub mod types;
pub mod error;
pub mod config;
pub mod topology;
pub mod transport;
pub mod allocator;
pub mod node;

pub use types::*;
pub use error::Error;
pub use config::NodeConfig;
pub use topology::Topology;
pub use transport::Transport;
pub use allocator::{allocate, Candidate};
pub use node::{CycleOutcome, MessageOutcome, Node, NodeState, PendingTransfer};
