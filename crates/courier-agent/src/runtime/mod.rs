//! Actor runtime for shops and vehicles.
//!
//! Each agent is one tokio task that owns its state and handles one inbound
//! envelope at a time. Timers (the collection window, the acceptance-ack
//! timeout, transit) never block the loop: the shop tracks a single deadline
//! inside `select!`, and a vehicle's transit runs as a separate task that
//! reports back through a private channel.
//!
//! Shutdown is signalled by flipping a `watch` channel to `true`. An agent
//! started through [`spawn_vehicle`] or [`spawn_shop`] leaves the bus when it
//! stops, so later sends to it fail with `UnknownAddress`.

mod shop;
mod vehicle;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use courier_proto::AgentId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ProtocolConfig;
use crate::error::AgentError;
use crate::shop::ShopProfile;
use crate::transport::LocalBus;
use crate::vehicle::{VehicleProfile, VehicleState};

pub use shop::{ShopAgent, ShopOutcome, ShopReport};
pub use vehicle::VehicleAgent;

/// Register a vehicle on the bus and run it until shutdown.
///
/// The task returns the vehicle's final state.
pub fn spawn_vehicle(
    bus: &LocalBus,
    profile: VehicleProfile,
    config: ProtocolConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<VehicleState>, AgentError> {
    let id = profile.id.clone();
    let inbox = bus.register(id.clone())?;
    let agent = VehicleAgent::new(profile, config, Arc::new(bus.clone()), inbox, shutdown);
    let bus = bus.clone();
    Ok(tokio::spawn(async move {
        let state = agent.run().await;
        bus.deregister(&id);
        state
    }))
}

/// Register a shop on the bus and run one demand cycle.
///
/// The task returns once the order is delivered, the retry budget is spent,
/// or shutdown is signalled.
pub fn spawn_shop(
    bus: &LocalBus,
    profile: ShopProfile,
    vehicles: Vec<AgentId>,
    config: ProtocolConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<ShopReport>, AgentError> {
    let id = profile.id.clone();
    let inbox = bus.register(id.clone())?;
    let agent = ShopAgent::new(profile, vehicles, config, Arc::new(bus.clone()), inbox, shutdown);
    let bus = bus.clone();
    Ok(tokio::spawn(async move {
        let report = agent.run().await;
        bus.deregister(&id);
        report
    }))
}
