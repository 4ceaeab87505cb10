//! Realtime biosignal monitor.
//!
//! Wires the pipeline together:
//! - realtime database client (REST streaming, or in-memory with the simulator)
//! - one stream source and collector per channel feeding the signal store
//! - pulse driver, dashboard server and periodic stats reporting

pub mod app;
pub mod config;
pub mod error;
pub mod simulator;
pub mod stats;

pub use app::Application;
pub use config::{AppConfig, OperatingMode, PathsConfig, SimulatorConfig};
pub use error::{AppError, AppResult};
pub use simulator::Simulator;
pub use stats::{ChannelReport, StatsReporter};
