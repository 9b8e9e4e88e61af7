//! Vehicle actor.

use std::sync::Arc;

use courier_proto::{AgentId, AgentMessage, DeliveryRequest, Envelope, RequestId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ProtocolConfig;
use crate::transport::{Mailbox, Transport};
use crate::vehicle::{VehicleProfile, VehicleState};

/// A vehicle agent bound to a transport.
pub struct VehicleAgent {
    state: VehicleState,
    config: ProtocolConfig,
    transport: Arc<dyn Transport>,
    inbox: Mailbox,
    shutdown: watch::Receiver<bool>,
    transit_tx: mpsc::UnboundedSender<RequestId>,
    transit_rx: mpsc::UnboundedReceiver<RequestId>,
}

impl VehicleAgent {
    /// Creates a vehicle agent.
    pub fn new(
        profile: VehicleProfile,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        inbox: Mailbox,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (transit_tx, transit_rx) = mpsc::unbounded_channel();
        Self {
            state: VehicleState::new(profile),
            config,
            transport,
            inbox,
            shutdown,
            transit_tx,
            transit_rx,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Handle messages until shutdown, then return the final state.
    pub async fn run(mut self) -> VehicleState {
        info!(
            vehicle = %self.state.id,
            capacity = self.state.capacity,
            speed = self.state.speed,
            position = %self.state.position,
            "vehicle started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => self.handle(&envelope),
                    None => break,
                },
                Some(request_id) = self.transit_rx.recv() => self.finish_delivery(request_id),
            }
        }

        info!(vehicle = %self.state.id, "vehicle stopped");
        self.state
    }

    fn handle(&mut self, envelope: &Envelope) {
        let message = match envelope.decode() {
            Ok(message) => message,
            Err(e) => {
                warn!(vehicle = %self.state.id, from = %envelope.from, error = %e, "dropping malformed message");
                return;
            }
        };

        match message {
            AgentMessage::DeliveryRequest(request) => self.on_request(&envelope.from, &request),
            AgentMessage::QueryAvailability => {
                let reply = AgentMessage::AvailabilityResponse {
                    available: self.state.is_available(),
                };
                self.reply(&envelope.from, &reply);
            }
            AgentMessage::AcceptDelivery {
                request_id,
                shop_id,
                shop_address,
            } => self.on_accept(request_id, &shop_id, shop_address),
            other => {
                warn!(vehicle = %self.state.id, from = %envelope.from, kind = other.kind(), "unexpected message");
            }
        }
    }

    fn on_request(&mut self, from: &AgentId, request: &DeliveryRequest) {
        info!(vehicle = %self.state.id, shop = %request.shop_id, request_id = %request.request_id, "delivery request received");

        let Some(proposal) = self.state.respond(request, &self.config) else {
            debug!(vehicle = %self.state.id, request_id = %request.request_id, "duplicate request ignored");
            return;
        };

        debug!(
            vehicle = %self.state.id,
            required = request.total_quantity(),
            free = self.state.free_space(),
            from = %self.state.position,
            to = %request.location,
            tariff = self.config.tariff_per_unit,
            "evaluated request"
        );

        match proposal.quote() {
            Some(quote) => info!(
                vehicle = %self.state.id,
                shop = %request.shop_id,
                cost = quote.cost,
                distance = quote.distance,
                estimated_time = quote.estimated_time,
                "proposal sent"
            ),
            None => info!(
                vehicle = %self.state.id,
                shop = %request.shop_id,
                reason = ?proposal.reason,
                "refusal sent"
            ),
        }

        self.reply(from, &AgentMessage::DeliveryProposal(proposal));
    }

    fn on_accept(&mut self, request_id: RequestId, shop_id: &AgentId, shop_address: AgentId) {
        match self.state.accept(request_id, shop_id, shop_address.clone()) {
            Ok(assignment) => {
                let (quantity, cost, estimated_time) =
                    (assignment.quantity, assignment.agreed_cost, assignment.estimated_time);
                info!(
                    vehicle = %self.state.id,
                    shop = %shop_id,
                    quantity,
                    cost,
                    load = self.state.current_load,
                    "assignment accepted"
                );
                let confirm = AgentMessage::AssignmentConfirmed {
                    request_id,
                    vehicle_id: self.state.id.clone(),
                    estimated_time,
                };
                self.reply(&shop_address, &confirm);
                self.begin_transit(request_id, estimated_time);
            }
            Err(reason) => {
                warn!(vehicle = %self.state.id, shop = %shop_id, %reason, "assignment rejected");
                let reject = AgentMessage::AssignmentRejected {
                    request_id,
                    vehicle_id: self.state.id.clone(),
                    reason,
                };
                self.reply(&shop_address, &reject);
            }
        }
    }

    fn begin_transit(&mut self, request_id: RequestId, estimated_time: f64) {
        if let Err(e) = self.state.start_delivery() {
            warn!(vehicle = %self.state.id, error = %e, "cannot start delivery");
            return;
        }
        let transit = self.config.transit_duration(estimated_time);
        info!(vehicle = %self.state.id, request_id = %request_id, transit_secs = transit.as_secs_f64(), "delivery started");

        let done = self.transit_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(transit).await;
            // The receiver is gone only if the vehicle already stopped.
            let _ = done.send(request_id);
        });
    }

    fn finish_delivery(&mut self, request_id: RequestId) {
        let Some(assignment) = self.state.assignment() else {
            warn!(vehicle = %self.state.id, request_id = %request_id, "transit finished without assignment");
            return;
        };
        if assignment.request_id != request_id {
            warn!(vehicle = %self.state.id, request_id = %request_id, "transit finished for unknown request");
            return;
        }

        let completed = AgentMessage::DeliveryCompleted {
            request_id,
            vehicle_id: assignment.vehicle_id.clone(),
            shop_id: assignment.shop_id.clone(),
        };
        let shop_address = assignment.shop_address.clone();
        self.reply(&shop_address, &completed);

        match self.state.complete_delivery() {
            Ok(done) => info!(
                vehicle = %self.state.id,
                shop = %done.shop_id,
                load = self.state.current_load,
                "delivery completed"
            ),
            Err(e) => warn!(vehicle = %self.state.id, error = %e, "cannot complete delivery"),
        }
    }

    fn reply(&self, to: &AgentId, message: &AgentMessage) {
        if let Err(e) = self.transport.send_message(&self.state.id, to, message) {
            warn!(vehicle = %self.state.id, to = %to, kind = message.kind(), error = %e, "send failed");
        }
    }
}
