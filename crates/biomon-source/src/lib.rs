//! Realtime database subscriptions for biomon.
//!
//! Bridges a push-based realtime database to pull-based sample streams:
//! - `RealtimeDatabase`: the observe/unobserve capability of a database client
//! - `RestStreamingClient`: REST event-stream client for a hosted database
//! - `MemoryDatabase`: in-process database for tests and simulation
//! - `StreamSource`: one shared listener per channel, decoded sample streams,
//!   exactly-once listener teardown when the last consumer detaches

pub mod database;
pub mod error;
pub mod memory;
pub mod rest;
pub mod source;
pub mod sse;

pub use database::{DataSnapshot, ListenerId, RealtimeDatabase, ValueListener};
pub use error::{RemoteError, RemoteResult, SourceError, SourceResult};
pub use memory::MemoryDatabase;
pub use rest::{RestClientConfig, RestStreamingClient};
pub use source::{
    EcgSource, EmgSource, HeartRateSource, SampleStream, SourcePhase, SourceSet, SourceStats,
    SourceStatsSnapshot, SourceStatus, StreamSource,
};
pub use sse::{SseDecoder, SseEvent};
