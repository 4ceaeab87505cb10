//! biomon-dashboard - browser view of the biosignal pipeline.
//!
//! Maps the signal store into renderable state and serves it:
//!
//! - chart normalization for the ECG / EMG batches
//! - heart pulse cue and the driver task that blinks the indicator
//! - REST snapshot, WebSocket updates, Prometheus metrics
//! - static HTML page drawing both charts and the pulse
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ SignalStore  │   │ StreamSource │   │  pulse driver  │
//! │   (Arc<>)    │   │  (status)    │   │ watch<bool>    │
//! └──────┬───────┘   └──────┬───────┘   └───────┬────────┘
//!        └──────────────────┼───────────────────┘
//!                           ▼
//!              DashboardState (views)
//!                           │
//!        axum: /  /api/snapshot  /ws  /metrics
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use biomon_dashboard::{run_pulse, run_server, DashboardConfig, DashboardState};
//!
//! let (beat_tx, beat_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(run_pulse(store.watch_heart_rate(), beat_tx, shutdown.clone()));
//!
//! let state = DashboardState::new(store, sources.statuses(), config.display_range(), beat_rx);
//! run_server(state, config, shutdown).await?;
//! ```

mod broadcast;
pub mod chart;
mod config;
mod error;
pub mod pulse;
mod server;
mod state;
mod types;

pub use chart::{normalize, ChartPoint, DisplayRange};
pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use pulse::{run_pulse, PulseCue, PulsePhase, PULSE_ON_MS};
pub use server::{create_router, run_server, AppState};
pub use state::{heart_rate_view, waveform_view, DashboardState};
pub use types::{
    DashboardMessage, DashboardSnapshot, HeartRateView, SourceView, ViewStatus, WaveformView,
};
