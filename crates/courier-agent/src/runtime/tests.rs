use std::time::Duration;

use courier_proto::{
    AgentId, AgentMessage, DeliveryRequest, Envelope, Needs, Position, Proposal, Quote,
    RefusalReason, RejectionReason, RequestId, TimeWindow,
};
use tokio::sync::watch;
use tokio::time::{timeout, Instant};

use super::*;
use crate::config::RetryPolicy;
use crate::transport::{Mailbox, Transport, TransportError};
use crate::vehicle::VehiclePhase;

fn id(s: &str) -> AgentId {
    AgentId::new(s)
}

fn shop_a() -> ShopProfile {
    ShopProfile::new(
        "Shop_A",
        Position::new(10.0, 20.0),
        TimeWindow::new(8.0, 18.0),
        Needs::new().with("product1", 50).with("product2", 30),
    )
}

fn request_from(shop: &str) -> DeliveryRequest {
    DeliveryRequest::new(
        id(shop),
        Position::new(10.0, 20.0),
        Needs::new().with("product1", 50),
        TimeWindow::new(8.0, 18.0),
    )
}

fn bid(request_id: RequestId, vehicle: &str, cost: f64) -> AgentMessage {
    AgentMessage::DeliveryProposal(Proposal::feasible(
        request_id,
        id(vehicle),
        Quote {
            cost,
            estimated_time: 0.5,
            distance: cost / 10.0,
            capacity_available: 100,
        },
    ))
}

async fn next(inbox: &mut Mailbox) -> (AgentId, AgentMessage) {
    let envelope = timeout(Duration::from_secs(120), inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("mailbox closed");
    let message = envelope.decode().expect("decodable message");
    (envelope.from, message)
}

async fn next_request(inbox: &mut Mailbox) -> DeliveryRequest {
    match next(inbox).await.1 {
        AgentMessage::DeliveryRequest(request) => request,
        other => panic!("expected delivery request, got {other:?}"),
    }
}

async fn next_proposal(inbox: &mut Mailbox) -> Proposal {
    match next(inbox).await.1 {
        AgentMessage::DeliveryProposal(proposal) => proposal,
        other => panic!("expected proposal, got {other:?}"),
    }
}

fn send(bus: &LocalBus, from: &str, to: &str, message: &AgentMessage) {
    bus.send_message(&id(from), &id(to), message).unwrap();
}

// ==========================================================================
// Full negotiation
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn cheapest_vehicle_wins_and_delivers() {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ProtocolConfig::default();

    let near = spawn_vehicle(
        &bus,
        VehicleProfile::new("vehicle1", 100, 60.0, Position::ORIGIN),
        config.clone(),
        shutdown_rx.clone(),
    )
    .unwrap();
    let far = spawn_vehicle(
        &bus,
        VehicleProfile::new("vehicle2", 150, 50.0, Position::new(100.0, 100.0)),
        config.clone(),
        shutdown_rx.clone(),
    )
    .unwrap();

    let shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("vehicle1"), id("vehicle2")],
        config,
        shutdown_rx,
    )
    .unwrap();

    let report = timeout(Duration::from_secs(60), shop).await.unwrap().unwrap();
    match &report.outcome {
        ShopOutcome::Delivered { vehicle_id, cost, .. } => {
            assert_eq!(vehicle_id.as_str(), "vehicle1");
            assert!((cost - 10.0 * 500_f64.sqrt()).abs() < 1e-6);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert!(report.is_delivered());

    shutdown_tx.send(true).unwrap();
    let winner = near.await.unwrap();
    let loser = far.await.unwrap();

    assert_eq!(winner.current_load, 0);
    assert!(winner.is_available());
    assert_eq!(winner.phase(), VehiclePhase::Free);
    assert_eq!(winner.position, Position::new(10.0, 20.0));
    assert_eq!(loser.current_load, 0);
    assert_eq!(loser.position, Position::new(100.0, 100.0));
}

#[tokio::test(start_paused = true)]
async fn all_refusals_exhaust_retry_budget() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_retries: 1,
            backoff_secs: 0.0,
        },
        ..ProtocolConfig::default()
    };

    let tiny = spawn_vehicle(
        &bus,
        VehicleProfile::new("tiny", 10, 60.0, Position::ORIGIN),
        config.clone(),
        shutdown_rx.clone(),
    )
    .unwrap();
    let shop = spawn_shop(&bus, shop_a(), vec![id("tiny")], config, shutdown_rx).unwrap();

    let report = timeout(Duration::from_secs(60), shop).await.unwrap().unwrap();
    assert_eq!(report.outcome, ShopOutcome::Exhausted { attempts: 2 });
    assert!(!tiny.is_finished());
}

// ==========================================================================
// Shop behavior against scripted vehicles
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn empty_window_triggers_exactly_one_retry() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_retries: 1,
            backoff_secs: 0.0,
        },
        ..ProtocolConfig::default()
    };

    let started = Instant::now();
    let shop = spawn_shop(&bus, shop_a(), vec![id("p1")], config, shutdown_rx).unwrap();

    let first = next_request(&mut p1).await;
    let second = next_request(&mut p1).await;
    assert_ne!(first.request_id, second.request_id);
    assert!(started.elapsed() >= Duration::from_secs(4));

    let report = shop.await.unwrap();
    assert_eq!(report.outcome, ShopOutcome::Exhausted { attempts: 2 });
    assert!(p1.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn backoff_delays_the_retry() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_retries: 1,
            backoff_secs: 3.0,
        },
        ..ProtocolConfig::default()
    };

    let started = Instant::now();
    let _shop = spawn_shop(&bus, shop_a(), vec![id("p1")], config, shutdown_rx).unwrap();

    next_request(&mut p1).await;
    next_request(&mut p1).await;
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn overflowing_backoff_parks_the_retry() {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_retries: 1,
            backoff_secs: 1e20,
        },
        ..ProtocolConfig::default()
    };

    let shop = spawn_shop(&bus, shop_a(), vec![id("p1")], config, shutdown_rx).unwrap();

    next_request(&mut p1).await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(p1.try_recv().is_err());
    assert!(!shop.is_finished());

    shutdown_tx.send(true).unwrap();
    assert_eq!(shop.await.unwrap().outcome, ShopOutcome::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn rejected_acceptance_falls_back_to_next_best() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let mut p2 = bus.register(id("p2")).unwrap();

    let shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("p1"), id("p2")],
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = next_request(&mut p1).await;
    next_request(&mut p2).await;
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));
    send(&bus, "p2", "Shop_A", &bid(req.request_id, "p2", 200.0));

    let (_, accept) = next(&mut p1).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { request_id, .. } if request_id == req.request_id));
    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::AssignmentRejected {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            reason: RejectionReason::AlreadyCommitted,
        },
    );

    let (_, accept) = next(&mut p2).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { .. }));
    send(
        &bus,
        "p2",
        "Shop_A",
        &AgentMessage::AssignmentConfirmed {
            request_id: req.request_id,
            vehicle_id: id("p2"),
            estimated_time: 0.5,
        },
    );
    send(
        &bus,
        "p2",
        "Shop_A",
        &AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("p2"),
            shop_id: id("Shop_A"),
        },
    );

    let report = shop.await.unwrap();
    assert_eq!(
        report.outcome,
        ShopOutcome::Delivered {
            request_id: req.request_id,
            vehicle_id: id("p2"),
            cost: 200.0,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn silent_winner_times_out_to_next_best() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let mut p2 = bus.register(id("p2")).unwrap();

    let _shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("p1"), id("p2")],
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = next_request(&mut p1).await;
    next_request(&mut p2).await;
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));
    send(&bus, "p2", "Shop_A", &bid(req.request_id, "p2", 200.0));

    let (_, accept) = next(&mut p1).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { .. }));
    let awarded = Instant::now();

    let (_, accept) = next(&mut p2).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { .. }));
    assert!(awarded.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn confirmed_winner_is_not_timed_out() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let mut p2 = bus.register(id("p2")).unwrap();

    let shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("p1"), id("p2")],
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = next_request(&mut p1).await;
    next_request(&mut p2).await;
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));
    send(&bus, "p2", "Shop_A", &bid(req.request_id, "p2", 200.0));
    next(&mut p1).await;
    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::AssignmentConfirmed {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            estimated_time: 0.5,
        },
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(p2.try_recv().is_err());

    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            shop_id: id("Shop_A"),
        },
    );
    assert!(shop.await.unwrap().is_delivered());
}

#[tokio::test(start_paused = true)]
async fn late_confirmation_does_not_displace_fallback_winner() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let mut p2 = bus.register(id("p2")).unwrap();

    let shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("p1"), id("p2")],
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = next_request(&mut p1).await;
    next_request(&mut p2).await;
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));
    send(&bus, "p2", "Shop_A", &bid(req.request_id, "p2", 200.0));
    next(&mut p1).await;

    // p1 stays silent past the ack timeout, so p2 gets the award.
    let (_, accept) = next(&mut p2).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { .. }));

    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::AssignmentConfirmed {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            estimated_time: 0.5,
        },
    );
    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            shop_id: id("Shop_A"),
        },
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!shop.is_finished());

    send(
        &bus,
        "p2",
        "Shop_A",
        &AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("p2"),
            shop_id: id("Shop_A"),
        },
    );
    assert_eq!(
        shop.await.unwrap().outcome,
        ShopOutcome::Delivered {
            request_id: req.request_id,
            vehicle_id: id("p2"),
            cost: 200.0,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn refusals_and_late_bids_are_not_awarded() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let config = ProtocolConfig {
        retry: RetryPolicy {
            max_retries: 0,
            backoff_secs: 0.0,
        },
        ..ProtocolConfig::default()
    };

    let shop = spawn_shop(&bus, shop_a(), vec![id("p1")], config, shutdown_rx).unwrap();

    let req = next_request(&mut p1).await;
    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::DeliveryProposal(Proposal::refusal(req.request_id, id("p1"), RefusalReason::Overloaded)),
    );
    send(&bus, "p1", "Shop_A", &bid(RequestId::new(), "p1", 1.0));

    let report = shop.await.unwrap();
    assert_eq!(report.outcome, ShopOutcome::Exhausted { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn shop_survives_malformed_messages() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();

    let shop = spawn_shop(&bus, shop_a(), vec![id("p1")], ProtocolConfig::default(), shutdown_rx).unwrap();

    let req = next_request(&mut p1).await;
    bus.send(Envelope::raw(id("p1"), id("Shop_A"), "{not json")).unwrap();
    bus.send(Envelope::raw(id("p1"), id("Shop_A"), r#"{"type":"teleport"}"#)).unwrap();
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));

    next(&mut p1).await;
    send(
        &bus,
        "p1",
        "Shop_A",
        &AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("p1"),
            shop_id: id("Shop_A"),
        },
    );
    assert!(shop.await.unwrap().is_delivered());
}

#[tokio::test(start_paused = true)]
async fn shop_without_vehicles_stops() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let shop = spawn_shop(&bus, shop_a(), Vec::new(), ProtocolConfig::default(), shutdown_rx).unwrap();
    assert_eq!(shop.await.unwrap().outcome, ShopOutcome::NoKnownVehicles);
}

#[tokio::test(start_paused = true)]
async fn stopped_agents_leave_the_bus() {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let vehicle = spawn_vehicle(
        &bus,
        VehicleProfile::new("v1", 100, 60.0, Position::ORIGIN),
        ProtocolConfig::default(),
        shutdown_rx.clone(),
    )
    .unwrap();
    let shop = spawn_shop(&bus, shop_a(), Vec::new(), ProtocolConfig::default(), shutdown_rx).unwrap();

    shop.await.unwrap();
    assert_eq!(
        bus.send_message(&id("v1"), &id("Shop_A"), &AgentMessage::QueryAvailability),
        Err(TransportError::UnknownAddress(id("Shop_A")))
    );

    shutdown_tx.send(true).unwrap();
    vehicle.await.unwrap();
    assert_eq!(
        bus.send_message(&id("Shop_A"), &id("v1"), &AgentMessage::QueryAvailability),
        Err(TransportError::UnknownAddress(id("v1")))
    );
    // The address is free again.
    assert!(bus.register(id("v1")).is_ok());
}

#[tokio::test(start_paused = true)]
async fn unreachable_vehicle_does_not_block_round() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();

    let shop = spawn_shop(
        &bus,
        shop_a(),
        vec![id("ghost"), id("p1")],
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = next_request(&mut p1).await;
    send(&bus, "p1", "Shop_A", &bid(req.request_id, "p1", 100.0));
    let (_, accept) = next(&mut p1).await;
    assert!(matches!(accept, AgentMessage::AcceptDelivery { .. }));
    drop(shop);
}

#[tokio::test(start_paused = true)]
async fn start_delay_postpones_first_request() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut p1 = bus.register(id("p1")).unwrap();
    let inbox = bus.register(id("Shop_A")).unwrap();

    let agent = ShopAgent::new(
        shop_a(),
        vec![id("p1")],
        ProtocolConfig::default(),
        std::sync::Arc::new(bus.clone()),
        inbox,
        shutdown_rx,
    )
    .with_start_delay(Duration::from_millis(1500));
    let started = Instant::now();
    tokio::spawn(agent.run());

    next_request(&mut p1).await;
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_waiting_shop() {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _p1 = bus.register(id("p1")).unwrap();

    let shop = spawn_shop(&bus, shop_a(), vec![id("p1")], ProtocolConfig::default(), shutdown_rx).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown_tx.send(true).unwrap();

    assert_eq!(shop.await.unwrap().outcome, ShopOutcome::Shutdown);
}

// ==========================================================================
// Vehicle behavior against a scripted shop
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn vehicle_answers_duplicate_request_once() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut shop = bus.register(id("s1")).unwrap();
    let _vehicle = spawn_vehicle(
        &bus,
        VehicleProfile::new("v1", 100, 60.0, Position::ORIGIN),
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = AgentMessage::DeliveryRequest(request_from("s1"));
    send(&bus, "s1", "v1", &req);
    send(&bus, "s1", "v1", &req);
    send(&bus, "s1", "v1", &AgentMessage::QueryAvailability);

    let proposal = next_proposal(&mut shop).await;
    assert!(proposal.can_deliver);
    let (_, after) = next(&mut shop).await;
    assert_eq!(after, AgentMessage::AvailabilityResponse { available: true });
}

#[tokio::test(start_paused = true)]
async fn vehicle_survives_malformed_messages() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut shop = bus.register(id("s1")).unwrap();
    let _vehicle = spawn_vehicle(
        &bus,
        VehicleProfile::new("v1", 100, 60.0, Position::ORIGIN),
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    bus.send(Envelope::raw(id("s1"), id("v1"), "garbage")).unwrap();
    send(&bus, "s1", "v1", &AgentMessage::QueryAvailability);

    let (from, reply) = next(&mut shop).await;
    assert_eq!(from, id("v1"));
    assert_eq!(reply, AgentMessage::AvailabilityResponse { available: true });
}

#[tokio::test(start_paused = true)]
async fn committed_vehicle_refuses_and_rejects_second_shop() {
    let bus = LocalBus::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut s1 = bus.register(id("s1")).unwrap();
    let mut s2 = bus.register(id("s2")).unwrap();
    let config = ProtocolConfig {
        transit_time_scale: 1000.0,
        ..ProtocolConfig::default()
    };
    let _vehicle = spawn_vehicle(
        &bus,
        VehicleProfile::new("v1", 100, 60.0, Position::ORIGIN),
        config,
        shutdown_rx,
    )
    .unwrap();

    let r1 = request_from("s1");
    let r2 = request_from("s2");
    send(&bus, "s1", "v1", &AgentMessage::DeliveryRequest(r1.clone()));
    send(&bus, "s2", "v1", &AgentMessage::DeliveryRequest(r2.clone()));
    assert!(next_proposal(&mut s1).await.can_deliver);
    assert!(next_proposal(&mut s2).await.can_deliver);

    send(
        &bus,
        "s1",
        "v1",
        &AgentMessage::AcceptDelivery {
            request_id: r1.request_id,
            shop_id: id("s1"),
            shop_address: id("s1"),
        },
    );
    let (_, confirmed) = next(&mut s1).await;
    assert!(matches!(confirmed, AgentMessage::AssignmentConfirmed { request_id, .. } if request_id == r1.request_id));

    send(
        &bus,
        "s2",
        "v1",
        &AgentMessage::AcceptDelivery {
            request_id: r2.request_id,
            shop_id: id("s2"),
            shop_address: id("s2"),
        },
    );
    let (_, rejected) = next(&mut s2).await;
    assert_eq!(
        rejected,
        AgentMessage::AssignmentRejected {
            request_id: r2.request_id,
            vehicle_id: id("v1"),
            reason: RejectionReason::AlreadyCommitted,
        }
    );

    send(&bus, "s2", "v1", &AgentMessage::DeliveryRequest(request_from("s2")));
    let refusal = next_proposal(&mut s2).await;
    assert!(!refusal.can_deliver);
    assert_eq!(refusal.reason, Some(RefusalReason::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn vehicle_reports_completion_after_transit() {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut s1 = bus.register(id("s1")).unwrap();
    let vehicle = spawn_vehicle(
        &bus,
        VehicleProfile::new("v1", 100, 60.0, Position::ORIGIN),
        ProtocolConfig::default(),
        shutdown_rx,
    )
    .unwrap();

    let req = request_from("s1");
    send(&bus, "s1", "v1", &AgentMessage::DeliveryRequest(req.clone()));
    let quote = next_proposal(&mut s1).await.quote().unwrap();
    send(
        &bus,
        "s1",
        "v1",
        &AgentMessage::AcceptDelivery {
            request_id: req.request_id,
            shop_id: id("s1"),
            shop_address: id("s1"),
        },
    );

    let started = Instant::now();
    next(&mut s1).await;
    let (_, done) = next(&mut s1).await;
    assert_eq!(
        done,
        AgentMessage::DeliveryCompleted {
            request_id: req.request_id,
            vehicle_id: id("v1"),
            shop_id: id("s1"),
        }
    );
    assert!(started.elapsed() >= Duration::from_secs_f64(quote.estimated_time) - Duration::from_millis(1));

    shutdown_tx.send(true).unwrap();
    let state = vehicle.await.unwrap();
    assert_eq!(state.current_load, 0);
    assert_eq!(state.position, Position::new(10.0, 20.0));
    assert!(state.is_available());
}
