//! Error type for the protocol core

use crate::types::NodeId;
use thiserror::Error;

/// Errors surfaced by the core.
///
/// Protocol decisions never fail; these only report a collaborator that
/// broke its contract or a message that could not be decoded.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Topology does not know node {0}")]
    UnknownNode(NodeId),

    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
