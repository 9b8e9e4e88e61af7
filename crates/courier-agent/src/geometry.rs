//! Straight-line geometry and tariff pricing.

use courier_proto::Position;

/// Reference tariff: cost units per distance unit.
pub const DEFAULT_TARIFF_PER_UNIT: f64 = 10.0;

/// Euclidean distance between two points.
#[must_use]
pub fn distance(a: Position, b: Position) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Transit time for `distance` at `speed`.
///
/// Returns `f64::INFINITY` when `speed` is not strictly positive.
#[must_use]
pub fn delivery_time(distance: f64, speed: f64) -> f64 {
    if speed > 0.0 {
        distance / speed
    } else {
        f64::INFINITY
    }
}

/// Price of covering `distance` at `tariff_per_unit`.
#[must_use]
pub fn cost(distance: f64, tariff_per_unit: f64) -> f64 {
    distance * tariff_per_unit
}

/// Distance, time and price of one trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripEstimate {
    /// Straight-line distance.
    pub distance: f64,
    /// Transit time (may be infinite).
    pub time: f64,
    /// Price.
    pub cost: f64,
}

impl TripEstimate {
    /// Estimate a trip from `from` to `to`.
    #[must_use]
    pub fn between(from: Position, to: Position, speed: f64, tariff_per_unit: f64) -> Self {
        let distance = distance(from, to);
        Self {
            distance,
            time: delivery_time(distance, speed),
            cost: cost(distance, tariff_per_unit),
        }
    }

    /// Returns true if the trip can actually be scheduled.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.time.is_finite() && self.cost.is_finite()
    }
}
