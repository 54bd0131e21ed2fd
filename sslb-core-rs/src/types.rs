//! Core types for the load balancing protocol

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Identifier of a node in the network
pub type NodeId = usize;

/// Integer unit of load
pub type Load = i64;

/// Protocol messages
///
/// Only two kinds exist: an offer of load and the binding answer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Offer up to `amount` units to a lighter neighbor
    #[serde(rename = "PROPOSAL")]
    Proposal {
        amount: Load,
        tentative_after_shed: f64,
        from: NodeId,
    },

    /// Amount of an offer actually accepted by `from`
    #[serde(rename = "ACK")]
    Ack { deal: Load, from: NodeId },
}

impl Message {
    /// Node that emitted the message
    pub fn sender(&self) -> NodeId {
        match self {
            Message::Proposal { from, .. } | Message::Ack { from, .. } => *from,
        }
    }

    /// Short label, used for counters and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Proposal { .. } => "proposal",
            Message::Ack { .. } => "ack",
        }
    }

    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A message addressed to a single receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message,
}

impl Envelope {
    pub fn new(from: NodeId, to: NodeId, message: Message) -> Self {
        Self { from, to, message }
    }
}

/// Amount of load offered to one neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub to: NodeId,
    pub amount: Load,
}

/// Scheduler state handed to every phase invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// Index of the cycle currently being driven
    pub cycle: u64,
}

impl Context {
    pub fn new(cycle: u64) -> Self {
        Self { cycle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::Proposal {
            amount: 2,
            tentative_after_shed: 6.0,
            from: 0,
        };

        let bytes = msg.to_bytes().unwrap();
        let parsed = Message::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_wire_shape() {
        let json = r#"{"type":"ACK","deal":3,"from":7}"#;
        let msg = Message::from_bytes(json.as_bytes()).unwrap();

        match msg {
            Message::Ack { deal, from } => {
                assert_eq!(deal, 3);
                assert_eq!(from, 7);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"type":"COMMIT","from":1}"#;
        assert!(matches!(
            Message::from_bytes(json.as_bytes()),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_sender_and_kind() {
        let ack = Message::Ack { deal: 0, from: 4 };
        assert_eq!(ack.sender(), 4);
        assert_eq!(ack.kind(), "ack");
    }
}
