//! Protocol timing and pricing configuration.
//!
//! Everything here is injected into the agents at construction; nothing in the
//! negotiation path reads a hardcoded constant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::geometry::DEFAULT_TARIFF_PER_UNIT;

/// Bound on automatic re-issues after a collection window with no bids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive failed rounds tolerated before the shop gives up.
    pub max_retries: u32,
    /// Base delay before a retry; doubled on each further attempt.
    pub backoff_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_secs: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// policy is spent.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        Some(secs(self.backoff_secs * factor))
    }
}

/// Negotiation parameters shared by shops and vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// How long a shop gathers proposals before deciding.
    pub collection_window_secs: f64,
    /// Cost units charged per distance unit.
    pub tariff_per_unit: f64,
    /// Speed used when a vehicle reports `speed <= 0`.
    pub default_speed_fallback: f64,
    /// How long a shop waits for the winner to confirm an acceptance.
    pub accept_timeout_secs: f64,
    /// Wall-clock seconds per unit of estimated transit time.
    pub transit_time_scale: f64,
    /// Retry bound for rounds that end without an award.
    pub retry: RetryPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            collection_window_secs: 4.0,
            tariff_per_unit: DEFAULT_TARIFF_PER_UNIT,
            default_speed_fallback: 50.0,
            accept_timeout_secs: 10.0,
            transit_time_scale: 1.0,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    /// Collection window as a duration.
    #[must_use]
    pub fn collection_window(&self) -> Duration {
        secs(self.collection_window_secs)
    }

    /// Acceptance-ack timeout as a duration.
    #[must_use]
    pub fn accept_timeout(&self) -> Duration {
        secs(self.accept_timeout_secs)
    }

    /// Wall-clock duration of a transit estimated at `estimated_time` units.
    #[must_use]
    pub fn transit_duration(&self, estimated_time: f64) -> Duration {
        secs(estimated_time * self.transit_time_scale)
    }

    /// The speed a vehicle actually evaluates with.
    #[must_use]
    pub fn effective_speed(&self, speed: f64) -> f64 {
        if speed > 0.0 {
            speed
        } else {
            self.default_speed_fallback
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(self.collection_window_secs.is_finite() && self.collection_window_secs > 0.0) {
            return Err(AgentError::Config(
                "collection_window_secs must be a positive number".to_string(),
            ));
        }
        if !(self.tariff_per_unit.is_finite() && self.tariff_per_unit >= 0.0) {
            return Err(AgentError::Config(
                "tariff_per_unit must be a non-negative number".to_string(),
            ));
        }
        if !self.default_speed_fallback.is_finite() {
            return Err(AgentError::Config(
                "default_speed_fallback must be finite".to_string(),
            ));
        }
        if !(self.accept_timeout_secs.is_finite() && self.accept_timeout_secs > 0.0) {
            return Err(AgentError::Config(
                "accept_timeout_secs must be a positive number".to_string(),
            ));
        }
        if !(self.transit_time_scale.is_finite() && self.transit_time_scale >= 0.0) {
            return Err(AgentError::Config(
                "transit_time_scale must be a non-negative number".to_string(),
            ));
        }
        if !(self.retry.backoff_secs.is_finite() && self.retry.backoff_secs >= 0.0) {
            return Err(AgentError::Config(
                "retry.backoff_secs must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Seconds to a `Duration`. Negative and NaN map to zero, anything too large
/// for a `Duration` saturates.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
