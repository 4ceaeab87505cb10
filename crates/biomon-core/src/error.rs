//! Error types for biomon-core.

use thiserror::Error;

/// Payload decode failure.
///
/// Always recovered by the caller: the offending update is dropped and the
/// subscription keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a string value (found {0})")]
    NotAString(&'static str),
}

/// Result type alias for decode operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Unknown channel name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown channel: {0}")]
pub struct UnknownChannel(pub String);
