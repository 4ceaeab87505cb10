//! Core domain types for the biomon biosignal pipeline.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Channel`: the three biosignal streams (ECG, EMG, heart rate)
//! - `EcgSample`, `EmgSample`, `HeartRateSample`: immutable decoded records
//! - `Sample`: tagged union of the three records
//! - Payload decoding from the remote JSON string format

pub mod channel;
pub mod decoder;
pub mod error;
pub mod sample;

pub use channel::Channel;
pub use decoder::{decode, payload_str, ChannelSample};
pub use error::{DecodeError, DecodeResult, UnknownChannel};
pub use sample::{EcgSample, EmgSample, HeartRateSample, Sample};
