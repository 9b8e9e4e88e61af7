//! Error types for courierd.

use thiserror::Error;

/// Errors raised while loading or running a scenario.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Agent error.
    #[error("agent error: {0}")]
    Agent(#[from] courier_agent::AgentError),

    /// An agent task panicked or was cancelled.
    #[error("agent task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
