//! Transport collaborator interface

use crate::types::Envelope;

/// Fire-and-forget message sink.
///
/// Implementations may delay, reorder or drop envelopes; the protocol
/// never waits for a reply.
pub trait Transport {
    fn send(&mut self, envelope: Envelope);
}

/// An outbox: envelopes are collected for the driver to route later
impl Transport for Vec<Envelope> {
    fn send(&mut self, envelope: Envelope) {
        self.push(envelope);
    }
}
