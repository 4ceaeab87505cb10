//! Signal aggregation for biomon.
//!
//! Holds the latest decoded sample per channel in a `SignalStore` and runs
//! one collector task per channel that copies source output into it.

pub mod collector;
pub mod error;
pub mod store;

pub use collector::{spawn_collectors, CollectorOutcome, Collectors};
pub use error::{FeedError, FeedResult};
pub use store::{SignalStore, SlotInfo, StoreSnapshot};
