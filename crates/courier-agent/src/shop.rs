//! Shop agent state: issuing requests, collecting bids, awarding deliveries.
//!
//! A shop has at most one open request. The request moves through
//! `CollectingProposals` to `AwaitingCompletion` and back to `Idle`; a round
//! that ends without an award returns to `Idle` and counts as a failed round.

use std::fmt;

use courier_proto::{AgentId, DeliveryRequest, Needs, Position, Proposal, RefusalReason, RequestId, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::negotiation::{select_winner, CollectedProposal};

/// Static description of a shop, as configured at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopProfile {
    /// Shop address.
    pub id: AgentId,
    /// Drop-off point.
    pub location: Position,
    /// Acceptable delivery window.
    pub time_window: TimeWindow,
    /// Products and quantities to order.
    pub needs: Needs,
}

impl ShopProfile {
    /// Creates a shop profile.
    #[must_use]
    pub fn new(id: impl Into<AgentId>, location: Position, time_window: TimeWindow, needs: Needs) -> Self {
        Self {
            id: id.into(),
            location,
            time_window,
            needs,
        }
    }
}

/// Where a shop's current order stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ShopPhase {
    /// No open request.
    Idle,
    /// Request broadcast; gathering feasible bids.
    CollectingProposals {
        /// The open request.
        request: DeliveryRequest,
        /// Feasible bids in arrival order.
        proposals: Vec<CollectedProposal>,
    },
    /// Winner sent an acceptance; waiting for the goods.
    AwaitingCompletion {
        /// The open request.
        request: DeliveryRequest,
        /// Vehicle the acceptance went to.
        winner: CollectedProposal,
        /// Remaining bids, in arrival order, for fallback.
        alternates: Vec<CollectedProposal>,
        /// Whether the winner acknowledged the acceptance.
        confirmed: bool,
    },
    /// Retry budget spent without an award.
    Exhausted,
}

impl ShopPhase {
    /// Data-free view of this phase.
    #[must_use]
    pub const fn status(&self) -> ShopStatus {
        match self {
            Self::Idle => ShopStatus::Idle,
            Self::CollectingProposals { .. } => ShopStatus::CollectingProposals,
            Self::AwaitingCompletion { .. } => ShopStatus::AwaitingCompletion,
            Self::Exhausted => ShopStatus::Exhausted,
        }
    }
}

/// Data-free view of [`ShopPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopStatus {
    /// No open request.
    Idle,
    /// Gathering bids.
    CollectingProposals,
    /// Waiting for delivery.
    AwaitingCompletion,
    /// Gave up.
    Exhausted,
}

impl ShopStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingProposals => "collecting_proposals",
            Self::AwaitingCompletion => "awaiting_completion",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ShopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an incoming proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalOutcome {
    /// Feasible and kept for selection.
    Collected,
    /// The vehicle declined.
    Refused(Option<RefusalReason>),
    /// Claims feasibility but carries no usable quote.
    Malformed,
    /// Not for the request currently collecting.
    Stale,
    /// This vehicle already bid on this request.
    Duplicate,
}

/// Result of closing a round or falling back after a failed award.
#[derive(Debug, Clone, PartialEq)]
pub enum Award {
    /// Send the acceptance to this vehicle.
    Winner(CollectedProposal),
    /// Nobody left to award; the round failed.
    NoBids,
}

/// Mutable state of a shop agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ShopState {
    profile: ShopProfile,
    phase: ShopPhase,
    failed_rounds: u32,
}

impl ShopState {
    /// Creates an idle shop.
    #[must_use]
    pub const fn new(profile: ShopProfile) -> Self {
        Self {
            profile,
            phase: ShopPhase::Idle,
            failed_rounds: 0,
        }
    }

    /// Shop address.
    #[must_use]
    pub const fn id(&self) -> &AgentId {
        &self.profile.id
    }

    /// Static profile.
    #[must_use]
    pub const fn profile(&self) -> &ShopProfile {
        &self.profile
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> &ShopPhase {
        &self.phase
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ShopStatus {
        self.phase.status()
    }

    /// Consecutive rounds that ended without an award.
    #[must_use]
    pub const fn failed_rounds(&self) -> u32 {
        self.failed_rounds
    }

    /// The open request, if any.
    #[must_use]
    pub const fn open_request(&self) -> Option<&DeliveryRequest> {
        match &self.phase {
            ShopPhase::CollectingProposals { request, .. }
            | ShopPhase::AwaitingCompletion { request, .. } => Some(request),
            ShopPhase::Idle | ShopPhase::Exhausted => None,
        }
    }

    /// Bids gathered so far in the current collection window.
    #[must_use]
    pub fn collected(&self) -> &[CollectedProposal] {
        match &self.phase {
            ShopPhase::CollectingProposals { proposals, .. } => proposals,
            _ => &[],
        }
    }

    /// Open a new request from the shop's needs.
    ///
    /// Fails if a request is already open.
    pub fn issue_request(&mut self) -> Result<&DeliveryRequest, AgentError> {
        if let Some(open) = self.open_request() {
            return Err(AgentError::RequestAlreadyOpen(open.request_id));
        }
        let request = DeliveryRequest::new(
            self.profile.id.clone(),
            self.profile.location,
            self.profile.needs.clone(),
            self.profile.time_window,
        );
        self.phase = ShopPhase::CollectingProposals {
            request,
            proposals: Vec::new(),
        };
        self.open_request().ok_or(AgentError::InvalidTransition {
            from: "idle",
            event: "issue_request",
        })
    }

    /// Record a proposal received from `sender`.
    pub fn record_proposal(&mut self, sender: AgentId, proposal: Proposal) -> ProposalOutcome {
        let ShopPhase::CollectingProposals { request, proposals } = &mut self.phase else {
            return ProposalOutcome::Stale;
        };
        if proposal.request_id != request.request_id {
            return ProposalOutcome::Stale;
        }
        if !proposal.can_deliver {
            return ProposalOutcome::Refused(proposal.reason);
        }
        let Some(quote) = proposal.quote() else {
            return ProposalOutcome::Malformed;
        };
        if proposals.iter().any(|p| p.vehicle_id == proposal.vehicle_id) {
            return ProposalOutcome::Duplicate;
        }
        proposals.push(CollectedProposal::new(sender, proposal.vehicle_id, quote));
        ProposalOutcome::Collected
    }

    /// Close the collection window and pick the cheapest bid.
    pub fn close_window(&mut self) -> Result<Award, AgentError> {
        let phase = std::mem::replace(&mut self.phase, ShopPhase::Idle);
        match phase {
            ShopPhase::CollectingProposals { request, proposals } => Ok(self.award(request, proposals)),
            other => {
                let from = other.status().as_str();
                self.phase = other;
                Err(AgentError::InvalidTransition {
                    from,
                    event: "close_window",
                })
            }
        }
    }

    /// Returns true if `vehicle_id` holds the outstanding award for `request_id`.
    #[must_use]
    pub fn is_current_award(&self, request_id: RequestId, vehicle_id: &AgentId) -> bool {
        matches!(
            &self.phase,
            ShopPhase::AwaitingCompletion { request, winner, .. }
                if request.request_id == request_id && winner.vehicle_id == *vehicle_id
        )
    }

    /// The winner confirmed the acceptance.
    ///
    /// Returns false if the confirmation is not for the current award.
    pub fn on_assignment_confirmed(&mut self, request_id: RequestId, vehicle_id: &AgentId) -> bool {
        match &mut self.phase {
            ShopPhase::AwaitingCompletion {
                request,
                winner,
                confirmed,
                ..
            } if request.request_id == request_id && winner.vehicle_id == *vehicle_id => {
                *confirmed = true;
                true
            }
            _ => false,
        }
    }

    /// Returns true if an acceptance is out and unacknowledged.
    #[must_use]
    pub const fn awaiting_confirmation(&self) -> bool {
        matches!(self.phase, ShopPhase::AwaitingCompletion { confirmed: false, .. })
    }

    /// The winner refused the acceptance; fall back to the next-best bid.
    ///
    /// Returns `None` if the rejection is not for the current award.
    pub fn on_assignment_rejected(&mut self, request_id: RequestId, vehicle_id: &AgentId) -> Option<Award> {
        if self.is_current_award(request_id, vehicle_id) {
            self.abandon_winner()
        } else {
            None
        }
    }

    /// Drop the current winner and re-run selection over the alternates.
    ///
    /// Returns `None` if no acceptance is outstanding.
    pub fn abandon_winner(&mut self) -> Option<Award> {
        let phase = std::mem::replace(&mut self.phase, ShopPhase::Idle);
        match phase {
            ShopPhase::AwaitingCompletion {
                request,
                alternates,
                ..
            } => Some(self.award(request, alternates)),
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// The winner delivered. Closes the order and returns the winning bid.
    ///
    /// Returns `None` if the completion is not for the current award.
    pub fn on_delivery_completed(&mut self, request_id: RequestId, vehicle_id: &AgentId) -> Option<CollectedProposal> {
        if !self.is_current_award(request_id, vehicle_id) {
            return None;
        }
        match std::mem::replace(&mut self.phase, ShopPhase::Idle) {
            ShopPhase::AwaitingCompletion { winner, .. } => {
                self.failed_rounds = 0;
                Some(winner)
            }
            _ => None,
        }
    }

    /// Give up: the retry budget is spent.
    pub fn mark_exhausted(&mut self) {
        self.phase = ShopPhase::Exhausted;
    }

    fn award(&mut self, request: DeliveryRequest, mut proposals: Vec<CollectedProposal>) -> Award {
        match select_winner(&proposals) {
            Some(index) => {
                let winner = proposals.remove(index);
                self.phase = ShopPhase::AwaitingCompletion {
                    request,
                    winner: winner.clone(),
                    alternates: proposals,
                    confirmed: false,
                };
                Award::Winner(winner)
            }
            None => {
                self.phase = ShopPhase::Idle;
                self.failed_rounds += 1;
                Award::NoBids
            }
        }
    }
}
