//! Topology collaborator interface

use crate::types::{Load, NodeId};

/// Read-only view of the network seen by a node during its cycle.
///
/// Returning `None` for an id means the id is unknown to the topology,
/// which the core reports as [`crate::Error::UnknownNode`].
pub trait Topology {
    /// Neighbors of `node`, in a stable order
    fn neighbors(&self, node: NodeId) -> Option<&[NodeId]>;

    /// Last known committed load of `node`
    fn load_of(&self, node: NodeId) -> Option<Load>;
}
