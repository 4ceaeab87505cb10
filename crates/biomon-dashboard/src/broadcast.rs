//! WebSocket broadcast functionality.
//!
//! The broadcaster checks the dashboard state at a fixed interval and sends
//! a full update to every connected client whenever the store version or the
//! pulse indicator changed since the last send.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;
use crate::types::DashboardMessage;

/// Run the broadcaster task until `shutdown` fires.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<String>,
    interval_ms: u64,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_key = state.change_key();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => {
                debug!("Broadcaster stopped");
                return;
            }
        }

        let key = state.change_key();
        if key == last_key {
            continue;
        }
        last_key = key;

        let msg = DashboardMessage::Update(state.collect_snapshot());
        match serde_json::to_string(&msg) {
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, "Broadcast update sent"),
                // no clients connected
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize dashboard update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::DisplayRange;
    use biomon_core::{HeartRateSample, Sample};
    use biomon_feed::SignalStore;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_sends_only_on_change() {
        let store = Arc::new(SignalStore::new());
        let (_beat_tx, beat_rx) = watch::channel(false);
        let state = DashboardState::new(store.clone(), vec![], DisplayRange::default(), beat_rx);
        let (tx, mut rx) = broadcast::channel(16);
        let shutdown = CancellationToken::new();
        tokio::spawn(run_broadcaster(state, tx, 100, shutdown.clone()));

        // idle store: nothing within several ticks
        assert!(timeout(Duration::from_millis(550), rx.recv()).await.is_err());

        store.update(Sample::HeartRate(HeartRateSample::new(72, 1)));
        let json = timeout(Duration::from_millis(150), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["heart_rate"]["bpm"], 72);

        assert!(timeout(Duration::from_millis(550), rx.recv()).await.is_err());
        shutdown.cancel();
    }
}
