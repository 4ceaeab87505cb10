//! Source collectors.
//!
//! A collector attaches to one channel's source and writes each decoded
//! sample into the store until the source terminates or shutdown is
//! requested. Dropping the collector's stream detaches it from the source.
//! Each stored sample's lag behind its producer timestamp is recorded.

use biomon_core::{Channel, ChannelSample};
use biomon_source::{SourceError, SourceSet, StreamSource};
use biomon_telemetry::Metrics;
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{FeedError, FeedResult};
use crate::store::SignalStore;

/// How a collector finished.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorOutcome {
    /// The source stream ended without an error.
    Completed,
    /// The source failed (subscribe failure or remote cancellation).
    Terminated(SourceError),
    /// Shutdown was requested.
    Shutdown,
}

/// Running collectors, one per channel.
pub struct Collectors {
    handles: Vec<(Channel, JoinHandle<CollectorOutcome>)>,
}

impl Collectors {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every collector to finish.
    pub async fn join(self) -> FeedResult<Vec<(Channel, CollectorOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (channel, handle) in self.handles {
            let outcome = handle.await.map_err(|e| FeedError::CollectorJoin {
                channel,
                reason: e.to_string(),
            })?;
            outcomes.push((channel, outcome));
        }
        Ok(outcomes)
    }
}

/// Start a collector per channel.
pub fn spawn_collectors(
    sources: &SourceSet,
    store: Arc<SignalStore>,
    shutdown: CancellationToken,
) -> Collectors {
    let handles = vec![
        (
            Channel::Ecg,
            tokio::spawn(collect(sources.ecg.clone(), store.clone(), shutdown.clone())),
        ),
        (
            Channel::Emg,
            tokio::spawn(collect(sources.emg.clone(), store.clone(), shutdown.clone())),
        ),
        (
            Channel::HeartRate,
            tokio::spawn(collect(sources.heart_rate.clone(), store, shutdown)),
        ),
    ];
    Collectors { handles }
}

/// Copy one source into the store.
pub async fn collect<S: ChannelSample>(
    source: StreamSource<S>,
    store: Arc<SignalStore>,
    shutdown: CancellationToken,
) -> CollectorOutcome {
    let channel = S::CHANNEL;
    let mut stream = match source.attach() {
        Ok(stream) => stream,
        Err(e) => {
            error!(channel = %channel, error = %e, "Collector failed to attach");
            return CollectorOutcome::Terminated(e);
        }
    };
    info!(channel = %channel, path = %source.path(), "Collector started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(channel = %channel, "Collector shutting down");
                return CollectorOutcome::Shutdown;
            }
            item = stream.next() => match item {
                Some(Ok(sample)) => {
                    debug!(channel = %channel, timestamp = sample.timestamp(), "Sample collected");
                    Metrics::sample_lag(channel, sample.timestamp(), Utc::now().timestamp_millis());
                    store.update(sample.into_sample());
                }
                Some(Err(e)) => {
                    error!(channel = %channel, error = %e, "Collector terminated by source");
                    return CollectorOutcome::Terminated(e);
                }
                None => {
                    info!(channel = %channel, "Collector stream completed");
                    return CollectorOutcome::Completed;
                }
            }
        }
    }
}
