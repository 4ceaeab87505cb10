//! Payload decoding.
//!
//! Each remote path holds a JSON-encoded string:
//! - ECG / EMG: `{"data": [int, ...], "timestamp": int}`
//! - heart rate: `{"value": int, "timestamp": int}`
//!
//! Decoding is pure. Any mismatch against the schema yields a `DecodeError`
//! and never a partially populated sample.

use crate::error::{DecodeError, DecodeResult};
use crate::{Channel, EcgSample, EmgSample, HeartRateSample, Sample};
use serde::Deserialize;
use serde_json::Value;

/// Raw waveform payload (ECG and EMG share the shape).
#[derive(Debug, Deserialize)]
struct RawWaveform {
    data: Vec<i32>,
    timestamp: i64,
}

/// Raw heart rate payload.
#[derive(Debug, Deserialize)]
struct RawHeartRate {
    value: u32,
    timestamp: i64,
}

/// A record type bound to one channel.
///
/// Lets channel-generic code (stream sources, store slots) decode and
/// inspect samples without matching on `Sample`.
pub trait ChannelSample: Clone + Default + PartialEq + Send + Sync + 'static {
    /// Channel this record type is carried on.
    const CHANNEL: Channel;

    /// Decode a raw payload string.
    fn decode(payload: &str) -> DecodeResult<Self>;

    /// Producer timestamp in epoch milliseconds.
    fn timestamp(&self) -> i64;

    /// True for the default "no data yet" record.
    fn is_empty(&self) -> bool;

    fn into_sample(self) -> Sample;
}

impl ChannelSample for EcgSample {
    const CHANNEL: Channel = Channel::Ecg;

    fn decode(payload: &str) -> DecodeResult<Self> {
        let raw: RawWaveform = serde_json::from_str(payload)?;
        Ok(EcgSample::new(raw.data, raw.timestamp))
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn is_empty(&self) -> bool {
        EcgSample::is_empty(self)
    }

    fn into_sample(self) -> Sample {
        Sample::Ecg(self)
    }
}

impl ChannelSample for EmgSample {
    const CHANNEL: Channel = Channel::Emg;

    fn decode(payload: &str) -> DecodeResult<Self> {
        let raw: RawWaveform = serde_json::from_str(payload)?;
        Ok(EmgSample::new(raw.data, raw.timestamp))
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn is_empty(&self) -> bool {
        EmgSample::is_empty(self)
    }

    fn into_sample(self) -> Sample {
        Sample::Emg(self)
    }
}

impl ChannelSample for HeartRateSample {
    const CHANNEL: Channel = Channel::HeartRate;

    fn decode(payload: &str) -> DecodeResult<Self> {
        let raw: RawHeartRate = serde_json::from_str(payload)?;
        Ok(HeartRateSample::new(raw.value, raw.timestamp))
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn is_empty(&self) -> bool {
        HeartRateSample::is_empty(self)
    }

    fn into_sample(self) -> Sample {
        Sample::HeartRate(self)
    }
}

/// Decode a payload for the given channel.
pub fn decode(channel: Channel, payload: &str) -> DecodeResult<Sample> {
    match channel {
        Channel::Ecg => EcgSample::decode(payload).map(Sample::Ecg),
        Channel::Emg => EmgSample::decode(payload).map(Sample::Emg),
        Channel::HeartRate => HeartRateSample::decode(payload).map(Sample::HeartRate),
    }
}

/// Extract the payload string from a database value.
///
/// `null` means the path holds nothing (`Ok(None)`). Any other non-string
/// value cannot be a payload.
pub fn payload_str(value: &Value) -> DecodeResult<Option<&str>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.as_str())),
        Value::Bool(_) => Err(DecodeError::NotAString("bool")),
        Value::Number(_) => Err(DecodeError::NotAString("number")),
        Value::Array(_) => Err(DecodeError::NotAString("array")),
        Value::Object(_) => Err(DecodeError::NotAString("object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_ecg_payload() {
        let sample = decode(Channel::Ecg, r#"{"data":[1,2,3],"timestamp":1000}"#).unwrap();
        assert_eq!(sample, Sample::Ecg(EcgSample::new(vec![1, 2, 3], 1000)));
    }

    #[test]
    fn test_decode_emg_payload() {
        let sample = EmgSample::decode(r#"{"data":[-5,0,4095],"timestamp":42}"#).unwrap();
        assert_eq!(sample.data, vec![-5, 0, 4095]);
        assert_eq!(sample.timestamp, 42);
    }

    #[test]
    fn test_decode_heart_rate_payload() {
        let sample = decode(Channel::HeartRate, r#"{"value":72,"timestamp":2000}"#).unwrap();
        assert_eq!(sample, Sample::HeartRate(HeartRateSample::new(72, 2000)));
    }

    #[test]
    fn test_decode_matches_encoded_sample() {
        let original = EcgSample::new(vec![512, 530, 2048, 600, -12], 1_700_000_000_123);
        let payload = json!({"data": original.data, "timestamp": original.timestamp}).to_string();
        assert_eq!(EcgSample::decode(&payload).unwrap(), original);

        let hr = HeartRateSample::new(181, 1_700_000_000_456);
        let payload = json!({"value": hr.value, "timestamp": hr.timestamp}).to_string();
        assert_eq!(HeartRateSample::decode(&payload).unwrap(), hr);
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let sample =
            EcgSample::decode(r#"{"data":[7],"timestamp":1,"device":"strap-01"}"#).unwrap();
        assert_eq!(sample, EcgSample::new(vec![7], 1));
    }

    #[test]
    fn test_empty_data_array_decodes() {
        let sample = EcgSample::decode(r#"{"data":[],"timestamp":9}"#).unwrap();
        assert!(sample.data.is_empty());
        assert_eq!(sample.timestamp, 9);
    }

    #[test]
    fn test_malformed_payloads_fail() {
        let cases = [
            (Channel::Ecg, "not json"),
            (Channel::Ecg, r#"{"timestamp":1000}"#),
            (Channel::Ecg, r#"{"data":[1,2,3]}"#),
            (Channel::Ecg, r#"{"data":[1,2.5,3],"timestamp":1000}"#),
            (Channel::Emg, r#"{"data":[1,"2",3],"timestamp":1000}"#),
            (Channel::Emg, r#"{"data":"1,2,3","timestamp":1000}"#),
            (Channel::Emg, r#"{"data":[1,2,3],"timestamp":"1000"}"#),
            (Channel::HeartRate, r#"{"timestamp":2000}"#),
            (Channel::HeartRate, r#"{"value":72}"#),
            (Channel::HeartRate, r#"{"value":-1,"timestamp":2000}"#),
            (Channel::HeartRate, r#"{"value":72.5,"timestamp":2000}"#),
            (Channel::HeartRate, r#"[72, 2000]"#),
            (Channel::HeartRate, ""),
        ];

        for (channel, payload) in cases {
            assert!(
                decode(channel, payload).is_err(),
                "expected {channel} payload {payload:?} to fail"
            );
        }
    }

    #[test]
    fn test_reading_out_of_range_fails() {
        let payload = format!(r#"{{"data":[{}],"timestamp":1}}"#, i64::from(i32::MAX) + 1);
        assert!(EcgSample::decode(&payload).is_err());
    }

    #[test]
    fn test_waveform_payload_on_heart_rate_channel_fails() {
        assert!(decode(Channel::HeartRate, r#"{"data":[1,2,3],"timestamp":1000}"#).is_err());
    }

    #[test]
    fn test_payload_str() {
        assert_eq!(payload_str(&Value::Null).unwrap(), None);
        assert_eq!(payload_str(&json!("{\"value\":1}")).unwrap(), Some("{\"value\":1}"));
        assert!(matches!(
            payload_str(&json!({"value": 1})),
            Err(DecodeError::NotAString("object"))
        ));
        assert!(matches!(
            payload_str(&json!(72)),
            Err(DecodeError::NotAString("number"))
        ));
    }
}
