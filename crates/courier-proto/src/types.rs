//! Core value types for the Courier protocol.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtoError;

/// Stable external address of an agent (shop or vehicle).
///
/// Opaque to the protocol: the transport routes on it, agents echo it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for one broadcast delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random `RequestId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a `RequestId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ProtoError::Validation(format!("invalid request ID: {e}")))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the plane. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// The origin `(0, 0)`.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns true if both coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Position {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.x, p.y]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Delivery time window `[open, close]` in scenario time units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct TimeWindow {
    /// Earliest acceptable delivery time.
    pub open: f64,
    /// Latest acceptable delivery time.
    pub close: f64,
}

impl TimeWindow {
    /// Create a time window.
    #[must_use]
    pub const fn new(open: f64, close: f64) -> Self {
        Self { open, close }
    }

    /// Returns true if the window is finite and `open <= close`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.open.is_finite() && self.close.is_finite() && self.open <= self.close
    }

    /// Returns true if `t` falls inside the window (inclusive).
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.open && t <= self.close
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.close - self.open).max(0.0)
    }
}

impl From<[f64; 2]> for TimeWindow {
    fn from([open, close]: [f64; 2]) -> Self {
        Self { open, close }
    }
}

impl From<TimeWindow> for [f64; 2] {
    fn from(w: TimeWindow) -> Self {
        [w.open, w.close]
    }
}

/// Product demand: product name to quantity.
///
/// Quantities are unsigned, so non-negativity holds by construction. Ordered by
/// product name so serialized requests are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Needs(BTreeMap<String, u64>);

impl Needs {
    /// Create an empty set of needs.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add (or accumulate) a quantity of a product.
    #[must_use]
    pub fn with(mut self, product: impl Into<String>, quantity: u64) -> Self {
        self.add(product, quantity);
        self
    }

    /// Add (or accumulate) a quantity of a product.
    pub fn add(&mut self, product: impl Into<String>, quantity: u64) {
        let entry = self.0.entry(product.into()).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Total quantity across all products.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |acc, q| acc.saturating_add(*q))
    }

    /// Quantity requested for one product, zero if absent.
    #[must_use]
    pub fn quantity(&self, product: &str) -> u64 {
        self.0.get(product).copied().unwrap_or(0)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(product, quantity)` pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for Needs {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut needs = Self::new();
        for (product, quantity) in iter {
            needs.add(product, quantity);
        }
        needs
    }
}
