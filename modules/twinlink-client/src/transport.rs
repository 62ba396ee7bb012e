//! The seam to the wire. Framing, reconnection and auth live behind it.

use std::sync::Arc;

use thiserror::Error;
use twinlink_signals::{CommandEnvelope, InboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no active session")]
    NotConnected,

    #[error("transport closed")]
    Closed,
}

/// Outbound half of a messaging session.
///
/// `send` must not block: hand the envelope to a writer queue and return.
/// `attach` is called once by the client so the transport can push inbound
/// messages as they arrive.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: CommandEnvelope) -> Result<(), TransportError>;

    fn attach(&self, receiver: Arc<dyn InboundReceiver>);
}

/// Push-model sink for inbound messages. May be called concurrently from
/// any number of transport worker contexts.
pub trait InboundReceiver: Send + Sync {
    fn on_inbound(&self, message: InboundMessage);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, envelope: CommandEnvelope) -> Result<(), TransportError> {
        (**self).send(envelope)
    }

    fn attach(&self, receiver: Arc<dyn InboundReceiver>) {
        (**self).attach(receiver)
    }
}
