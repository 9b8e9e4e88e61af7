//! Shop actor.

use std::sync::Arc;
use std::time::Duration;

use courier_proto::{AgentId, AgentMessage, Envelope, Proposal, RequestId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::error::AgentError;
use crate::negotiation::CollectedProposal;
use crate::shop::{Award, ProposalOutcome, ShopProfile, ShopState};
use crate::transport::{Mailbox, Transport};

/// How a shop's demand cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShopOutcome {
    /// The winning vehicle delivered.
    Delivered {
        /// Request that was fulfilled.
        request_id: RequestId,
        /// Vehicle that delivered.
        vehicle_id: AgentId,
        /// Agreed cost.
        cost: f64,
    },
    /// Every round ended without an award.
    Exhausted {
        /// Rounds attempted.
        attempts: u32,
    },
    /// The shop has nobody to ask.
    NoKnownVehicles,
    /// Stopped before the order closed.
    Shutdown,
}

/// Final report of a shop agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopReport {
    /// Shop address.
    pub shop_id: AgentId,
    /// How the cycle ended.
    #[serde(flatten)]
    pub outcome: ShopOutcome,
}

impl ShopReport {
    /// Returns true if the order was delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self.outcome, ShopOutcome::Delivered { .. })
    }
}

/// Upper bound on any timer; `Instant` cannot represent `now + Duration::MAX`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    /// Start the next round.
    Issue,
    /// Close the collection window.
    CollectionWindow,
    /// Give up on an unacknowledged acceptance.
    AcceptAck,
}

/// A shop agent bound to a transport.
pub struct ShopAgent {
    state: ShopState,
    vehicles: Vec<AgentId>,
    config: ProtocolConfig,
    transport: Arc<dyn Transport>,
    inbox: Mailbox,
    shutdown: watch::Receiver<bool>,
    timer: Option<(Instant, Timer)>,
    start_delay: Duration,
    finished: Option<ShopOutcome>,
}

impl ShopAgent {
    /// Creates a shop agent that will ask `vehicles` for bids.
    pub fn new(
        profile: ShopProfile,
        vehicles: Vec<AgentId>,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        inbox: Mailbox,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state: ShopState::new(profile),
            vehicles,
            config,
            transport,
            inbox,
            shutdown,
            timer: None,
            start_delay: Duration::ZERO,
            finished: None,
        }
    }

    /// Wait this long before broadcasting the first request.
    #[must_use]
    pub const fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ShopState {
        &self.state
    }

    /// Run one demand cycle and report how it ended.
    pub async fn run(mut self) -> ShopReport {
        info!(
            shop = %self.state.id(),
            location = %self.state.profile().location,
            needs = self.state.profile().needs.total(),
            vehicles = self.vehicles.len(),
            "shop started"
        );
        self.arm(self.start_delay, Timer::Issue);

        while self.finished.is_none() {
            if *self.shutdown.borrow() {
                self.finish(ShopOutcome::Shutdown);
                break;
            }
            let deadline = self.timer.map(|(at, _)| at);
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        self.finish(ShopOutcome::Shutdown);
                    }
                }
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => self.handle(&envelope),
                    None => self.finish(ShopOutcome::Shutdown),
                },
                () = sleep_until(deadline), if deadline.is_some() => {
                    if let Some((_, timer)) = self.timer.take() {
                        self.on_timer(timer);
                    }
                }
            }
        }

        let outcome = self.finished.take().unwrap_or(ShopOutcome::Shutdown);
        info!(shop = %self.state.id(), ?outcome, "shop stopped");
        ShopReport {
            shop_id: self.state.id().clone(),
            outcome,
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Issue => self.begin_round(),
            Timer::CollectionWindow => self.close_window(),
            Timer::AcceptAck => {
                if self.state.awaiting_confirmation() {
                    warn!(shop = %self.state.id(), "acceptance not acknowledged in time");
                    if let Some(award) = self.state.abandon_winner() {
                        self.handle_award(award);
                    }
                }
            }
        }
    }

    fn begin_round(&mut self) {
        if self.vehicles.is_empty() {
            warn!(shop = %self.state.id(), error = %AgentError::NoKnownVehicles, "cannot issue request");
            self.finish(ShopOutcome::NoKnownVehicles);
            return;
        }

        let request = match self.state.issue_request() {
            Ok(request) => request.clone(),
            Err(e) => {
                warn!(shop = %self.state.id(), error = %e, "cannot issue request");
                return;
            }
        };

        info!(
            shop = %self.state.id(),
            request_id = %request.request_id,
            quantity = request.total_quantity(),
            round = self.state.failed_rounds() + 1,
            "broadcasting delivery request"
        );

        let message = AgentMessage::DeliveryRequest(request);
        for vehicle in &self.vehicles {
            if let Err(e) = self.transport.send_message(self.state.id(), vehicle, &message) {
                warn!(shop = %self.state.id(), vehicle = %vehicle, error = %e, "request not delivered");
            }
        }

        self.arm(self.config.collection_window(), Timer::CollectionWindow);
    }

    fn close_window(&mut self) {
        let collected = self.state.collected().len();
        for p in self.state.collected() {
            info!(
                shop = %self.state.id(),
                vehicle = %p.vehicle_id,
                cost = p.quote.cost,
                distance = p.quote.distance,
                estimated_time = p.quote.estimated_time,
                "proposal"
            );
        }
        debug!(shop = %self.state.id(), collected, "collection window closed");

        match self.state.close_window() {
            Ok(award) => self.handle_award(award),
            Err(e) => warn!(shop = %self.state.id(), error = %e, "collection window closed out of phase"),
        }
    }

    fn handle_award(&mut self, mut award: Award) {
        loop {
            match award {
                Award::Winner(winner) => {
                    if self.send_acceptance(&winner) {
                        self.arm(self.config.accept_timeout(), Timer::AcceptAck);
                        return;
                    }
                    match self.state.abandon_winner() {
                        Some(next) => award = next,
                        None => return,
                    }
                }
                Award::NoBids => {
                    self.schedule_retry();
                    return;
                }
            }
        }
    }

    fn send_acceptance(&self, winner: &CollectedProposal) -> bool {
        let Some(request) = self.state.open_request() else {
            return false;
        };
        info!(
            shop = %self.state.id(),
            vehicle = %winner.vehicle_id,
            cost = winner.cost(),
            "winner selected"
        );
        let accept = AgentMessage::AcceptDelivery {
            request_id: request.request_id,
            shop_id: self.state.id().clone(),
            shop_address: self.state.id().clone(),
        };
        match self.transport.send_message(self.state.id(), &winner.sender, &accept) {
            Ok(()) => true,
            Err(e) => {
                warn!(shop = %self.state.id(), vehicle = %winner.vehicle_id, error = %e, "acceptance not delivered");
                false
            }
        }
    }

    fn schedule_retry(&mut self) {
        let attempt = self.state.failed_rounds();
        match self.config.retry.delay_for(attempt) {
            Some(delay) => {
                info!(
                    shop = %self.state.id(),
                    attempt,
                    max_retries = self.config.retry.max_retries,
                    delay_secs = delay.as_secs_f64(),
                    "no proposals, retrying"
                );
                if delay.is_zero() {
                    self.begin_round();
                } else {
                    self.arm(delay, Timer::Issue);
                }
            }
            None => {
                warn!(shop = %self.state.id(), attempts = attempt, "no proposals, giving up");
                self.state.mark_exhausted();
                self.finish(ShopOutcome::Exhausted { attempts: attempt });
            }
        }
    }

    fn handle(&mut self, envelope: &Envelope) {
        let message = match envelope.decode() {
            Ok(message) => message,
            Err(e) => {
                warn!(shop = %self.state.id(), from = %envelope.from, error = %e, "dropping malformed message");
                return;
            }
        };

        match message {
            AgentMessage::DeliveryProposal(proposal) => self.on_proposal(&envelope.from, proposal),
            AgentMessage::AssignmentConfirmed {
                request_id,
                vehicle_id,
                estimated_time,
            } => {
                if self.state.on_assignment_confirmed(request_id, &vehicle_id) {
                    info!(shop = %self.state.id(), vehicle = %vehicle_id, estimated_time, "assignment confirmed");
                    self.timer = None;
                } else {
                    // An abandoned winner that confirms late still delivers.
                    warn!(
                        shop = %self.state.id(),
                        vehicle = %vehicle_id,
                        request_id = %request_id,
                        "confirmation from a vehicle that no longer holds the award"
                    );
                }
            }
            AgentMessage::AssignmentRejected {
                request_id,
                vehicle_id,
                reason,
            } => match self.state.on_assignment_rejected(request_id, &vehicle_id) {
                Some(award) => {
                    warn!(shop = %self.state.id(), vehicle = %vehicle_id, %reason, "winner rejected acceptance");
                    self.timer = None;
                    self.handle_award(award);
                }
                None => debug!(shop = %self.state.id(), vehicle = %vehicle_id, "stale rejection ignored"),
            },
            AgentMessage::DeliveryCompleted {
                request_id,
                vehicle_id,
                ..
            } => match self.state.on_delivery_completed(request_id, &vehicle_id) {
                Some(winner) => {
                    info!(shop = %self.state.id(), vehicle = %vehicle_id, cost = winner.cost(), "delivery completed");
                    self.finish(ShopOutcome::Delivered {
                        request_id,
                        vehicle_id,
                        cost: winner.cost(),
                    });
                }
                None => warn!(shop = %self.state.id(), vehicle = %vehicle_id, "completion from non-winner ignored"),
            },
            AgentMessage::AvailabilityResponse { available } => {
                debug!(shop = %self.state.id(), from = %envelope.from, available, "availability response");
            }
            other => {
                warn!(shop = %self.state.id(), from = %envelope.from, kind = other.kind(), "unexpected message");
            }
        }
    }

    fn on_proposal(&mut self, from: &AgentId, proposal: Proposal) {
        let vehicle_id = proposal.vehicle_id.clone();
        match self.state.record_proposal(from.clone(), proposal) {
            ProposalOutcome::Collected => {
                debug!(shop = %self.state.id(), vehicle = %vehicle_id, "proposal collected");
            }
            ProposalOutcome::Refused(reason) => {
                info!(shop = %self.state.id(), vehicle = %vehicle_id, ?reason, "vehicle refused");
            }
            ProposalOutcome::Malformed => {
                warn!(shop = %self.state.id(), vehicle = %vehicle_id, "proposal without usable quote dropped");
            }
            ProposalOutcome::Stale => {
                debug!(shop = %self.state.id(), vehicle = %vehicle_id, "late proposal ignored");
            }
            ProposalOutcome::Duplicate => {
                debug!(shop = %self.state.id(), vehicle = %vehicle_id, "duplicate proposal ignored");
            }
        }
    }

    fn arm(&mut self, after: Duration, timer: Timer) {
        self.timer = Some((Instant::now() + after.min(FAR_FUTURE), timer));
    }

    fn finish(&mut self, outcome: ShopOutcome) {
        self.timer = None;
        self.finished = Some(outcome);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
