//! Error types for courier-agent.

use courier_proto::RequestId;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur in agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The shop already has a request in flight.
    #[error("request already open: {0}")]
    RequestAlreadyOpen(RequestId),

    /// The shop has nobody to broadcast to.
    #[error("no known vehicles to broadcast to")]
    NoKnownVehicles,

    /// A state machine was driven along an edge it does not have.
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition {
        /// State the machine was in.
        from: &'static str,
        /// Event that was applied.
        event: &'static str,
    },

    /// Protocol configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
