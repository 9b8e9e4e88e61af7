//! Scenario runner.
//!
//! Boots every vehicle and shop from a [`ScenarioConfig`] on one [`LocalBus`],
//! waits for each shop to finish its demand cycle, then stops the fleet.

use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use courier_agent::{
    spawn_vehicle, AgentError, LocalBus, ShopAgent, ShopOutcome, ShopReport, VehicleState,
};
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::ScenarioConfig;
use crate::error::DaemonError;

/// Start-up jitter applied to each shop by default, in seconds.
pub const DEFAULT_START_JITTER: RangeInclusive<f64> = 0.5..=2.0;

/// Options for a scenario run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Random delay range, in seconds, before each shop's first request.
    pub start_jitter: Option<RangeInclusive<f64>>,
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// One report per shop, in configuration order.
    pub shops: Vec<ShopReport>,
    /// Final vehicle states, in configuration order.
    pub vehicles: Vec<VehicleState>,
}

impl RunSummary {
    /// Number of shops whose order was delivered.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.shops.iter().filter(|r| r.is_delivered()).count()
    }

    /// Sum of agreed costs over delivered orders.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.shops
            .iter()
            .map(|r| match r.outcome {
                ShopOutcome::Delivered { cost, .. } => cost,
                _ => 0.0,
            })
            .sum()
    }
}

/// Run a scenario until every shop finishes or `interrupt` resolves.
///
/// # Errors
///
/// Returns an error if an agent cannot be registered or an agent task fails.
pub async fn run(
    config: &ScenarioConfig,
    options: RunOptions,
    interrupt: impl Future<Output = ()>,
) -> Result<RunSummary, DaemonError> {
    let bus = LocalBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut vehicles = Vec::with_capacity(config.vehicles.len());
    for vehicle in &config.vehicles {
        info!(
            vehicle = %vehicle.id,
            name = vehicle.display_name(),
            capacity = vehicle.capacity,
            speed = vehicle.speed,
            "starting vehicle"
        );
        vehicles.push(spawn_vehicle(
            &bus,
            vehicle.profile(),
            config.protocol.clone(),
            shutdown_rx.clone(),
        )?);
    }

    let roster = config.vehicle_ids();
    let delays = start_delays(config.shops.len(), options.start_jitter.as_ref());
    let mut shops = JoinSet::new();
    for ((index, shop), delay) in config.shops.iter().enumerate().zip(delays) {
        let shop_id = shop.profile().id;
        let inbox = bus.register(shop_id.clone()).map_err(AgentError::from)?;
        let agent = ShopAgent::new(
            shop.profile(),
            roster.clone(),
            config.protocol.clone(),
            Arc::new(bus.clone()),
            inbox,
            shutdown_rx.clone(),
        )
        .with_start_delay(delay);
        info!(shop = %shop.id, delay_secs = delay.as_secs_f64(), "starting shop");
        let routes = bus.clone();
        shops.spawn(async move {
            let report = agent.run().await;
            routes.deregister(&shop_id);
            (index, report)
        });
    }

    let mut reports: Vec<Option<ShopReport>> = vec![None; config.shops.len()];
    tokio::pin!(interrupt);
    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = shops.join_next() => match joined {
                Some(result) => {
                    let (index, report) = result?;
                    if let Some(slot) = reports.get_mut(index) {
                        *slot = Some(report);
                    }
                }
                None => break,
            },
            () = &mut interrupt, if !interrupted => {
                warn!("interrupted, stopping agents");
                interrupted = true;
                // Receivers live in the agents; a send error only means they are all gone.
                let _ = shutdown_tx.send(true);
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let mut fleet = Vec::with_capacity(vehicles.len());
    for handle in vehicles {
        fleet.push(handle.await?);
    }

    Ok(RunSummary {
        shops: reports.into_iter().flatten().collect(),
        vehicles: fleet,
    })
}

fn start_delays(count: usize, jitter: Option<&RangeInclusive<f64>>) -> Vec<Duration> {
    let Some(range) = jitter.filter(|r| r.start() <= r.end()) else {
        return vec![Duration::ZERO; count];
    };
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let secs = rng.gen_range(range.clone());
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
        })
        .collect()
}

/// Log a one-line summary per shop and vehicle.
pub fn log_summary(summary: &RunSummary) {
    for report in &summary.shops {
        match &report.outcome {
            ShopOutcome::Delivered {
                vehicle_id, cost, ..
            } => info!(shop = %report.shop_id, vehicle = %vehicle_id, cost, "delivered"),
            ShopOutcome::Exhausted { attempts } => {
                warn!(shop = %report.shop_id, attempts, "no vehicle could deliver");
            }
            ShopOutcome::NoKnownVehicles => warn!(shop = %report.shop_id, "no vehicles configured"),
            ShopOutcome::Shutdown => warn!(shop = %report.shop_id, "stopped before delivery"),
        }
    }
    for vehicle in &summary.vehicles {
        info!(
            vehicle = %vehicle.id,
            position = %vehicle.position,
            load = vehicle.current_load,
            phase = %vehicle.phase(),
            "final state"
        );
    }
    info!(
        delivered = summary.delivered(),
        shops = summary.shops.len(),
        total_cost = summary.total_cost(),
        "scenario finished"
    );
}
