//! Winner selection and the binding assignment it produces.
//!
//! Proposals are non-binding. A shop picks the cheapest collected bid; the
//! vehicle turns it into an [`Assignment`] only if its capacity still allows.

use chrono::{DateTime, Utc};
use courier_proto::{AgentId, Position, Quote, RequestId};
use serde::{Deserialize, Serialize};

/// A feasible bid held by a shop, tagged with where to send the acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedProposal {
    /// Transport address the proposal arrived from.
    pub sender: AgentId,
    /// Vehicle that made the bid.
    pub vehicle_id: AgentId,
    /// Priced terms.
    pub quote: Quote,
}

impl CollectedProposal {
    /// Creates a collected proposal.
    #[must_use]
    pub fn new(sender: AgentId, vehicle_id: AgentId, quote: Quote) -> Self {
        Self {
            sender,
            vehicle_id,
            quote,
        }
    }

    /// Bid price.
    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.quote.cost
    }
}

/// Index of the cheapest proposal.
///
/// Ties go to the earliest collected proposal, so the result depends only on
/// collection order. Returns `None` for an empty slice.
#[must_use]
pub fn select_winner(proposals: &[CollectedProposal]) -> Option<usize> {
    proposals
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.cost() + 0.0).total_cmp(&(b.cost() + 0.0)))
        .map(|(index, _)| index)
}

/// A committed delivery, owned by the vehicle until it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Request being fulfilled.
    pub request_id: RequestId,
    /// Receiving shop.
    pub shop_id: AgentId,
    /// Where completion is reported.
    pub shop_address: AgentId,
    /// Delivering vehicle.
    pub vehicle_id: AgentId,
    /// Quantity loaded for this delivery.
    pub quantity: u64,
    /// Drop-off point.
    pub destination: Position,
    /// Price agreed at bid time.
    pub agreed_cost: f64,
    /// Transit time estimated at bid time.
    pub estimated_time: f64,
    /// When the vehicle committed.
    pub accepted_at: DateTime<Utc>,
}
