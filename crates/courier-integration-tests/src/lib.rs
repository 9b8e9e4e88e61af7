//! Integration test crate for Courier components.
//!
//! This crate exists solely to run integration tests that span the protocol,
//! agent, and runner crates. It has no public API - all functionality is in
//! the test modules.

#![forbid(unsafe_code)]
