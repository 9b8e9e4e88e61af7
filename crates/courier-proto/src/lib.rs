//! # courier-proto
//!
//! Message contract shared by Courier shop and vehicle agents.
//!
//! Every message travels as a JSON object tagged with a `"type"` field
//! (`delivery_request`, `delivery_proposal`, `accept_delivery`, ...). The
//! transport only moves [`Envelope`]s; decoding happens at the receiving agent.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod messages;
pub mod types;

pub use error::ProtoError;
pub use messages::{
    AgentMessage, DeliveryRequest, Envelope, Proposal, Quote, RefusalReason, RejectionReason,
};
pub use types::{AgentId, Needs, Position, RequestId, TimeWindow};
