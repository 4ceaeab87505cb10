//! Prometheus metrics and structured logging for biomon.
//!
//! - Prometheus metrics for per-channel sample flow and listener state
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
