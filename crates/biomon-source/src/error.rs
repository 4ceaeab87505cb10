//! Source error types.

use biomon_core::Channel;
use thiserror::Error;

/// Failure reported by the realtime database for a listener.
///
/// Fatal for the listener it is reported on. Never retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Listener cancelled by server: {0}")]
    Cancelled(String),

    #[error("Authorization revoked")]
    AuthRevoked,

    #[error("HTTP status {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Event stream closed by remote")]
    Disconnected,

    #[error("Malformed event stream: {0}")]
    Protocol(String),

    #[error("No async runtime: {0}")]
    NoRuntime(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Error surfaced to sample stream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The channel's listener failed. Terminal for the stream.
    #[error("{channel} subscription terminated: {error}")]
    Remote {
        channel: Channel,
        #[source]
        error: RemoteError,
    },

    /// The listener could not be established.
    #[error("{channel} subscribe failed: {error}")]
    Subscribe {
        channel: Channel,
        #[source]
        error: RemoteError,
    },
}

impl SourceError {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Remote { channel, .. } | Self::Subscribe { channel, .. } => *channel,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
