//! Protocol message definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::types::{AgentId, Needs, Position, RequestId, TimeWindow};

/// A shop's call for bids, broadcast to every known vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Correlates proposals and acceptances with this request.
    pub request_id: RequestId,
    /// Requesting shop.
    pub shop_id: AgentId,
    /// Where the goods must be delivered.
    pub location: Position,
    /// Products and quantities.
    #[serde(rename = "products")]
    pub needs: Needs,
    /// Acceptable delivery window.
    pub time_window: TimeWindow,
    /// When the request was issued.
    #[serde(rename = "timestamp")]
    pub issued_at: DateTime<Utc>,
}

impl DeliveryRequest {
    /// Build a new request with a fresh id, issued now.
    #[must_use]
    pub fn new(shop_id: AgentId, location: Position, needs: Needs, time_window: TimeWindow) -> Self {
        Self {
            request_id: RequestId::new(),
            shop_id,
            location,
            needs,
            time_window,
            issued_at: Utc::now(),
        }
    }

    /// Total quantity the vehicle would have to carry.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.needs.total()
    }
}

/// Why a vehicle declined to bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    /// Not enough free capacity for the requested quantity.
    Overloaded,
    /// Already committed to another delivery.
    Unavailable,
    /// Delivery time cannot be estimated (no usable speed).
    Unreachable,
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overloaded => write!(f, "overloaded"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Why a vehicle refused an acceptance it had bid on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The vehicle committed to another shop after bidding.
    AlreadyCommitted,
    /// The offered quantity no longer fits.
    InsufficientCapacity,
    /// No outstanding offer matches the acceptance.
    NoMatchingOffer,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyCommitted => write!(f, "already committed"),
            Self::InsufficientCapacity => write!(f, "insufficient capacity"),
            Self::NoMatchingOffer => write!(f, "no matching offer"),
        }
    }
}

/// Priced terms of a feasible bid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Price of the delivery (`distance * tariff`).
    pub cost: f64,
    /// Estimated transit time.
    pub estimated_time: f64,
    /// Straight-line distance to the shop.
    pub distance: f64,
    /// Free capacity the vehicle had when it bid.
    pub capacity_available: u64,
}

/// A vehicle's answer to a [`DeliveryRequest`].
///
/// On the wire a feasible proposal carries the quote fields and an infeasible
/// one carries `reason`; the other group is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Request this proposal answers.
    pub request_id: RequestId,
    /// Bidding vehicle.
    pub vehicle_id: AgentId,
    /// Whether the vehicle can take the delivery.
    pub can_deliver: bool,
    /// Price, present when feasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Transit time, present when feasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
    /// Distance, present when feasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Free capacity, present when feasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_available: Option<u64>,
    /// Refusal reason, present when infeasible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RefusalReason>,
}

impl Proposal {
    /// A feasible bid.
    #[must_use]
    pub const fn feasible(request_id: RequestId, vehicle_id: AgentId, quote: Quote) -> Self {
        Self {
            request_id,
            vehicle_id,
            can_deliver: true,
            cost: Some(quote.cost),
            estimated_time: Some(quote.estimated_time),
            distance: Some(quote.distance),
            capacity_available: Some(quote.capacity_available),
            reason: None,
        }
    }

    /// A refusal.
    #[must_use]
    pub const fn refusal(request_id: RequestId, vehicle_id: AgentId, reason: RefusalReason) -> Self {
        Self {
            request_id,
            vehicle_id,
            can_deliver: false,
            cost: None,
            estimated_time: None,
            distance: None,
            capacity_available: None,
            reason: Some(reason),
        }
    }

    /// The quote, if this is a well-formed feasible bid.
    ///
    /// A proposal claiming `can_deliver` but missing any quote field, or
    /// carrying a non-finite or negative price, yields `None`.
    #[must_use]
    pub fn quote(&self) -> Option<Quote> {
        if !self.can_deliver {
            return None;
        }
        let quote = Quote {
            // `+ 0.0` folds a negative zero into zero.
            cost: self.cost? + 0.0,
            estimated_time: self.estimated_time?,
            distance: self.distance?,
            capacity_available: self.capacity_available?,
        };
        (quote.cost.is_finite() && quote.cost >= 0.0).then_some(quote)
    }
}

/// Every message exchanged between shops and vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Shop → vehicles: call for bids.
    DeliveryRequest(DeliveryRequest),
    /// Any → vehicle: ask whether the vehicle is free.
    QueryAvailability,
    /// Vehicle → querier.
    AvailabilityResponse {
        /// Current availability flag.
        available: bool,
    },
    /// Vehicle → shop: bid or refusal.
    DeliveryProposal(Proposal),
    /// Shop → winning vehicle.
    AcceptDelivery {
        /// Request being awarded.
        request_id: RequestId,
        /// Awarding shop.
        shop_id: AgentId,
        /// Where completion must be reported.
        shop_address: AgentId,
    },
    /// Vehicle → shop: acceptance committed.
    AssignmentConfirmed {
        /// Request being fulfilled.
        request_id: RequestId,
        /// Committed vehicle.
        vehicle_id: AgentId,
        /// Transit time the vehicle will take.
        estimated_time: f64,
    },
    /// Vehicle → shop: acceptance refused (double-booked or stale).
    AssignmentRejected {
        /// Request that was refused.
        request_id: RequestId,
        /// Refusing vehicle.
        vehicle_id: AgentId,
        /// Why.
        reason: RejectionReason,
    },
    /// Vehicle → shop: goods delivered.
    DeliveryCompleted {
        /// Request that was fulfilled.
        request_id: RequestId,
        /// Delivering vehicle.
        vehicle_id: AgentId,
        /// Receiving shop.
        shop_id: AgentId,
    },
}

impl AgentMessage {
    /// The wire `type` tag, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DeliveryRequest(_) => "delivery_request",
            Self::QueryAvailability => "query_availability",
            Self::AvailabilityResponse { .. } => "availability_response",
            Self::DeliveryProposal(_) => "delivery_proposal",
            Self::AcceptDelivery { .. } => "accept_delivery",
            Self::AssignmentConfirmed { .. } => "assignment_confirmed",
            Self::AssignmentRejected { .. } => "assignment_rejected",
            Self::DeliveryCompleted { .. } => "delivery_completed",
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// A routed message: addressing plus an encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender address; replies go here.
    pub from: AgentId,
    /// Recipient address.
    pub to: AgentId,
    /// JSON-encoded [`AgentMessage`].
    pub body: String,
}

impl Envelope {
    /// Encode a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized.
    pub fn encode(from: AgentId, to: AgentId, message: &AgentMessage) -> Result<Self, ProtoError> {
        Ok(Self {
            from,
            to,
            body: message.to_json()?,
        })
    }

    /// Wrap an already encoded body.
    #[must_use]
    pub fn raw(from: AgentId, to: AgentId, body: impl Into<String>) -> Self {
        Self {
            from,
            to,
            body: body.into(),
        }
    }

    /// Decode the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid message.
    pub fn decode(&self) -> Result<AgentMessage, ProtoError> {
        AgentMessage::from_json(&self.body)
    }
}
