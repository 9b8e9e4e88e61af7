//! Scenario configuration.
//!
//! One JSON file describes a whole run:
//! - Protocol parameters shared by every agent
//! - The vehicle fleet
//! - The shops and their orders

use std::collections::HashSet;
use std::path::Path;

use courier_agent::{AgentError, ProtocolConfig, ShopProfile, VehicleProfile};
use courier_proto::{AgentId, Needs, Position, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// One vehicle in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleConfig {
    /// Vehicle address.
    pub id: String,
    /// Display name for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Carrying capacity in units.
    pub capacity: u64,
    /// Distance units per time unit. Non-positive values use the protocol fallback.
    pub speed: f64,
    /// Starting position, `[x, y]`.
    #[serde(default)]
    pub position: Position,
}

impl VehicleConfig {
    /// Runtime profile for this vehicle.
    #[must_use]
    pub fn profile(&self) -> VehicleProfile {
        VehicleProfile::new(self.id.as_str(), self.capacity, self.speed, self.position)
    }

    /// Display name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// One shop and its order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopConfig {
    /// Shop address.
    pub id: String,
    /// Drop-off point, `[x, y]`.
    pub location: Position,
    /// Delivery window, `[open, close]`.
    pub time_window: TimeWindow,
    /// Products and quantities.
    pub needs: Needs,
}

impl ShopConfig {
    /// Runtime profile for this shop.
    #[must_use]
    pub fn profile(&self) -> ShopProfile {
        ShopProfile::new(self.id.as_str(), self.location, self.time_window, self.needs.clone())
    }
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    /// Protocol parameters.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Vehicle fleet.
    pub vehicles: Vec<VehicleConfig>,
    /// Shops.
    pub shops: Vec<ShopConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            vehicles: vec![
                VehicleConfig {
                    id: "vehicle1".to_string(),
                    name: Some("Truck-1".to_string()),
                    capacity: 100,
                    speed: 60.0,
                    position: Position::ORIGIN,
                },
                VehicleConfig {
                    id: "vehicle2".to_string(),
                    name: Some("Truck-2".to_string()),
                    capacity: 150,
                    speed: 50.0,
                    position: Position::ORIGIN,
                },
                VehicleConfig {
                    id: "vehicle3".to_string(),
                    name: Some("Truck-3".to_string()),
                    capacity: 80,
                    speed: 70.0,
                    position: Position::ORIGIN,
                },
            ],
            shops: vec![
                ShopConfig {
                    id: "Shop_A".to_string(),
                    location: Position::new(10.0, 20.0),
                    time_window: TimeWindow::new(8.0, 18.0),
                    needs: Needs::new().with("product1", 50).with("product2", 30),
                },
                ShopConfig {
                    id: "Shop_B".to_string(),
                    location: Position::new(25.0, 15.0),
                    time_window: TimeWindow::new(9.0, 17.0),
                    needs: Needs::new().with("product1", 70).with("product3", 40),
                },
                ShopConfig {
                    id: "Shop_C".to_string(),
                    location: Position::new(5.0, 30.0),
                    time_window: TimeWindow::new(10.0, 16.0),
                    needs: Needs::new().with("product2", 60).with("product3", 20),
                },
            ],
        }
    }
}

impl ScenarioConfig {
    /// Load a scenario from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DaemonError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DaemonError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse a scenario from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the scenario fails validation.
    pub fn from_json(content: &str) -> Result<Self, DaemonError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| DaemonError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Write the scenario as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DaemonError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DaemonError::Config(format!("cannot encode config: {e}")))?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Vehicle addresses, in configuration order.
    #[must_use]
    pub fn vehicle_ids(&self) -> Vec<AgentId> {
        self.vehicles.iter().map(|v| AgentId::new(v.id.as_str())).collect()
    }

    /// Validate the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<(), DaemonError> {
        self.protocol.validate().map_err(|e| match e {
            AgentError::Config(message) => DaemonError::Config(format!("protocol: {message}")),
            other => DaemonError::Agent(other),
        })?;

        if self.vehicles.is_empty() {
            return Err(DaemonError::Config(
                "at least one vehicle is required".to_string(),
            ));
        }
        if self.shops.is_empty() {
            return Err(DaemonError::Config(
                "at least one shop is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let ids = self
            .vehicles
            .iter()
            .map(|v| v.id.as_str())
            .chain(self.shops.iter().map(|s| s.id.as_str()));
        for id in ids {
            if id.trim().is_empty() {
                return Err(DaemonError::Config("agent id cannot be empty".to_string()));
            }
            if !seen.insert(id) {
                return Err(DaemonError::Config(format!("duplicate agent id: {id}")));
            }
        }

        for vehicle in &self.vehicles {
            if vehicle.capacity == 0 {
                return Err(DaemonError::Config(format!(
                    "vehicle {}: capacity must be greater than 0",
                    vehicle.id
                )));
            }
            if vehicle.speed.is_nan() {
                return Err(DaemonError::Config(format!(
                    "vehicle {}: speed must be a number",
                    vehicle.id
                )));
            }
            if !vehicle.position.is_finite() {
                return Err(DaemonError::Config(format!(
                    "vehicle {}: position must be finite",
                    vehicle.id
                )));
            }
        }

        for shop in &self.shops {
            if !shop.location.is_finite() {
                return Err(DaemonError::Config(format!(
                    "shop {}: location must be finite",
                    shop.id
                )));
            }
            if !shop.time_window.is_valid() {
                return Err(DaemonError::Config(format!(
                    "shop {}: time_window open must not be after close",
                    shop.id
                )));
            }
        }

        Ok(())
    }
}
