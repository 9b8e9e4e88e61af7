//! Vehicle agent state: evaluating requests, bidding, committing and delivering.
//!
//! A vehicle answers every delivery request with exactly one proposal. Bidding
//! never touches load or availability; those change only when a shop's
//! acceptance is committed, and change back when the delivery completes.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use courier_proto::{
    AgentId, DeliveryRequest, Position, Proposal, Quote, RefusalReason, RejectionReason,
    RequestId,
};
use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::error::AgentError;
use crate::geometry::TripEstimate;
use crate::negotiation::Assignment;

/// Static description of a vehicle, as configured at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Vehicle address.
    pub id: AgentId,
    /// Carrying capacity in units.
    pub capacity: u64,
    /// Distance units per time unit.
    pub speed: f64,
    /// Starting position.
    pub position: Position,
}

impl VehicleProfile {
    /// Creates a vehicle profile.
    #[must_use]
    pub fn new(id: impl Into<AgentId>, capacity: u64, speed: f64, position: Position) -> Self {
        Self {
            id: id.into(),
            capacity,
            speed,
            position,
        }
    }
}

/// Lifecycle of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehiclePhase {
    /// No active assignment; may bid.
    Free,
    /// Acceptance committed, transit not yet started.
    Committed,
    /// In transit.
    Delivering,
}

impl VehiclePhase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Committed => "committed",
            Self::Delivering => "delivering",
        }
    }
}

impl fmt::Display for VehiclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terms a vehicle last answered a shop with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Request the offer answers.
    pub request_id: RequestId,
    /// Drop-off point.
    pub destination: Position,
    /// Quantity requested.
    pub quantity: u64,
    /// The bid, or `None` if the vehicle refused.
    pub quote: Option<Quote>,
}

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Proposal to send back to the shop.
    pub proposal: Proposal,
    /// What the vehicle should remember about its answer.
    pub offer: Offer,
}

/// Mutable state of a vehicle agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// Vehicle address.
    pub id: AgentId,
    /// Carrying capacity in units.
    pub capacity: u64,
    /// Configured speed (may be non-positive; see `default_speed_fallback`).
    pub speed: f64,
    /// Units currently loaded.
    pub current_load: u64,
    /// Current position.
    pub position: Position,
    available: bool,
    phase: VehiclePhase,
    assignment: Option<Assignment>,
    offers: HashMap<AgentId, Offer>,
}

impl VehicleState {
    /// Creates an empty, free vehicle.
    #[must_use]
    pub fn new(profile: VehicleProfile) -> Self {
        Self {
            id: profile.id,
            capacity: profile.capacity,
            speed: profile.speed,
            current_load: 0,
            position: profile.position,
            available: true,
            phase: VehiclePhase::Free,
            assignment: None,
            offers: HashMap::new(),
        }
    }

    /// Returns unloaded capacity.
    #[must_use]
    pub const fn free_space(&self) -> u64 {
        self.capacity.saturating_sub(self.current_load)
    }

    /// Returns true while no delivery is committed.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> VehiclePhase {
        self.phase
    }

    /// The active assignment, if any.
    #[must_use]
    pub const fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// The last answer given to `shop`, if still outstanding.
    #[must_use]
    pub fn offer_for(&self, shop: &AgentId) -> Option<&Offer> {
        self.offers.get(shop)
    }

    /// Evaluate a request without changing any state.
    ///
    /// Availability is checked before capacity so a busy vehicle reports
    /// `unavailable` even when the load would also not fit.
    #[must_use]
    pub fn evaluate(&self, request: &DeliveryRequest, config: &ProtocolConfig) -> Evaluation {
        let quantity = request.total_quantity();
        let free_space = self.free_space();
        let capacity_ok = quantity <= free_space;
        let trip = TripEstimate::between(
            self.position,
            request.location,
            config.effective_speed(self.speed),
            config.tariff_per_unit,
        );

        let refusal = if !self.available {
            Some(RefusalReason::Unavailable)
        } else if !capacity_ok {
            Some(RefusalReason::Overloaded)
        } else if !trip.is_reachable() {
            Some(RefusalReason::Unreachable)
        } else {
            None
        };

        let (proposal, quote) = match refusal {
            Some(reason) => (
                Proposal::refusal(request.request_id, self.id.clone(), reason),
                None,
            ),
            None => {
                let quote = Quote {
                    cost: trip.cost,
                    estimated_time: trip.time,
                    distance: trip.distance,
                    capacity_available: free_space,
                };
                (
                    Proposal::feasible(request.request_id, self.id.clone(), quote),
                    Some(quote),
                )
            }
        };

        Evaluation {
            proposal,
            offer: Offer {
                request_id: request.request_id,
                destination: request.location,
                quantity,
                quote,
            },
        }
    }

    /// Answer a request, remembering the terms offered to its shop.
    ///
    /// Returns `None` for a request this vehicle has already answered, so a
    /// redelivered broadcast never produces a second bid.
    pub fn respond(&mut self, request: &DeliveryRequest, config: &ProtocolConfig) -> Option<Proposal> {
        if self
            .offers
            .get(&request.shop_id)
            .is_some_and(|offer| offer.request_id == request.request_id)
        {
            return None;
        }
        let evaluation = self.evaluate(request, config);
        self.offers.insert(request.shop_id.clone(), evaluation.offer);
        Some(evaluation.proposal)
    }

    /// Commit to a shop's acceptance.
    ///
    /// Re-checks availability and fit against the offer the shop accepted,
    /// since bids are non-binding and may have gone stale. On success the
    /// vehicle becomes unavailable and carries the quantity.
    pub fn accept(
        &mut self,
        request_id: RequestId,
        shop_id: &AgentId,
        shop_address: AgentId,
    ) -> Result<&Assignment, RejectionReason> {
        if !self.available || self.phase != VehiclePhase::Free {
            return Err(RejectionReason::AlreadyCommitted);
        }

        let (quantity, destination, quote) = match self.offers.get(shop_id) {
            Some(Offer {
                request_id: offered,
                quantity,
                destination,
                quote: Some(quote),
            }) if *offered == request_id => (*quantity, *destination, *quote),
            _ => return Err(RejectionReason::NoMatchingOffer),
        };

        if quantity > self.free_space() {
            return Err(RejectionReason::InsufficientCapacity);
        }

        self.offers.remove(shop_id);
        self.available = false;
        self.current_load += quantity;
        self.phase = VehiclePhase::Committed;
        Ok(&*self.assignment.insert(Assignment {
            request_id,
            shop_id: shop_id.clone(),
            shop_address,
            vehicle_id: self.id.clone(),
            quantity,
            destination,
            agreed_cost: quote.cost,
            estimated_time: quote.estimated_time,
            accepted_at: Utc::now(),
        }))
    }

    /// Move from `Committed` to `Delivering`.
    pub fn start_delivery(&mut self) -> Result<&Assignment, AgentError> {
        if self.phase != VehiclePhase::Committed {
            return Err(AgentError::InvalidTransition {
                from: self.phase.as_str(),
                event: "start_delivery",
            });
        }
        let assignment = self.assignment.as_ref().ok_or(AgentError::InvalidTransition {
            from: self.phase.as_str(),
            event: "start_delivery",
        })?;
        self.phase = VehiclePhase::Delivering;
        Ok(assignment)
    }

    /// Finish the delivery: unload, move to the drop-off, become free.
    pub fn complete_delivery(&mut self) -> Result<Assignment, AgentError> {
        if self.phase != VehiclePhase::Delivering {
            return Err(AgentError::InvalidTransition {
                from: self.phase.as_str(),
                event: "complete_delivery",
            });
        }
        let assignment = self.assignment.take().ok_or(AgentError::InvalidTransition {
            from: self.phase.as_str(),
            event: "complete_delivery",
        })?;
        self.current_load = self.current_load.saturating_sub(assignment.quantity);
        self.position = assignment.destination;
        self.available = true;
        self.phase = VehiclePhase::Free;
        Ok(assignment)
    }
}
