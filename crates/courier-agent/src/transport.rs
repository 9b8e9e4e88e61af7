//! Message transport between agents.
//!
//! The protocol only needs point-to-point delivery of [`Envelope`]s between
//! named endpoints, FIFO per sender/receiver pair. [`LocalBus`] provides that
//! in-process with one unbounded mailbox per agent.

use std::collections::HashMap;
use std::sync::Arc;

use courier_proto::{AgentId, AgentMessage, Envelope};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

/// Inbound queue of an agent.
pub type Mailbox = mpsc::UnboundedReceiver<Envelope>;

/// Errors raised when a single message cannot be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nobody is registered under this address.
    #[error("unknown address: {0}")]
    UnknownAddress(AgentId),

    /// The recipient stopped reading its mailbox.
    #[error("mailbox closed: {0}")]
    MailboxClosed(AgentId),

    /// The address is already taken.
    #[error("address already registered: {0}")]
    AddressInUse(AgentId),

    /// The message could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Point-to-point delivery of envelopes.
pub trait Transport: Send + Sync {
    /// Deliver one envelope to `envelope.to`.
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Encode and deliver a message.
    fn send_message(&self, from: &AgentId, to: &AgentId, message: &AgentMessage) -> Result<(), TransportError> {
        let envelope = Envelope::encode(from.clone(), to.clone(), message)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        self.send(envelope)
    }
}

/// In-process transport: a routing table of agent mailboxes.
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    routes: Arc<RwLock<HashMap<AgentId, mpsc::UnboundedSender<Envelope>>>>,
}

impl LocalBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address and return its mailbox.
    pub fn register(&self, id: AgentId) -> Result<Mailbox, TransportError> {
        let mut routes = self.routes.write();
        if routes.get(&id).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::AddressInUse(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert(id, tx);
        Ok(rx)
    }

    /// Remove an address. Later sends to it fail with `UnknownAddress`.
    pub fn deregister(&self, id: &AgentId) -> bool {
        self.routes.write().remove(id).is_some()
    }
}

impl Transport for LocalBus {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let tx = self
            .routes
            .read()
            .get(&envelope.to)
            .cloned()
            .ok_or_else(|| TransportError::UnknownAddress(envelope.to.clone()))?;
        let to = envelope.to.clone();
        tx.send(envelope).map_err(|_| TransportError::MailboxClosed(to))
    }
}
