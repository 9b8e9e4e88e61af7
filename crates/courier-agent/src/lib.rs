//! # courier-agent
//!
//! Shop and vehicle agents for decentralized delivery assignment.
//!
//! This crate provides:
//!
//! - **Geometry**: [`geometry`] for distance, transit time and tariff pricing
//! - **Vehicle state**: [`VehicleState`] for feasibility checks, bids and the
//!   `Free → Committed → Delivering → Free` lifecycle
//! - **Shop state**: [`ShopState`] for request issuance, proposal collection
//!   and award fallback
//! - **Winner selection**: [`select_winner`] for lowest-cost, first-collected
//!   tie-breaking
//! - **Runtime**: [`runtime`] actors that drive the state machines over a
//!   [`Transport`]
//!
//! ## Example
//!
//! ```rust
//! use courier_agent::{ProtocolConfig, VehicleProfile, VehicleState};
//! use courier_proto::{AgentId, DeliveryRequest, Needs, Position, TimeWindow};
//!
//! let vehicle = VehicleState::new(VehicleProfile::new("truck-1", 100, 50.0, Position::ORIGIN));
//! let request = DeliveryRequest::new(
//!     AgentId::new("shop-a"),
//!     Position::new(30.0, 40.0),
//!     Needs::new().with("flour", 80),
//!     TimeWindow::new(8.0, 18.0),
//! );
//!
//! let evaluation = vehicle.evaluate(&request, &ProtocolConfig::default());
//! let quote = evaluation.proposal.quote().unwrap();
//! assert_eq!(quote.distance, 50.0);
//! assert_eq!(quote.cost, 500.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod negotiation;
pub mod runtime;
pub mod shop;
pub mod transport;
pub mod vehicle;

pub use error::AgentError;

// Re-exports for convenience
pub use config::{ProtocolConfig, RetryPolicy};
pub use negotiation::{select_winner, Assignment, CollectedProposal};
pub use runtime::{spawn_shop, spawn_vehicle, ShopAgent, ShopOutcome, ShopReport, VehicleAgent};
pub use shop::{Award, ProposalOutcome, ShopPhase, ShopProfile, ShopState, ShopStatus};
pub use transport::{LocalBus, Mailbox, Transport, TransportError};
pub use vehicle::{Evaluation, Offer, VehiclePhase, VehicleProfile, VehicleState};
