//! Feed error types.

use biomon_core::Channel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Collector for {channel} failed to complete: {reason}")]
    CollectorJoin { channel: Channel, reason: String },
}

pub type FeedResult<T> = Result<T, FeedError>;
