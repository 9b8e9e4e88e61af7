//! Error types for the courier-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or validating messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a message.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a message.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}
