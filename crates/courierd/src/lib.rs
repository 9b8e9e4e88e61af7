//! courierd - Courier scenario runner
//!
//! Loads a scenario of shops and vehicles, boots each as an agent on an
//! in-process bus, and lets them negotiate deliveries until every shop's
//! order is settled.

pub mod config;
pub mod error;
pub mod scenario;

pub use config::{ScenarioConfig, ShopConfig, VehicleConfig};
pub use error::DaemonError;
pub use scenario::{run, RunOptions, RunSummary, DEFAULT_START_JITTER};
