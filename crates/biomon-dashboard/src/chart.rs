//! Waveform chart normalization.
//!
//! Maps a batch of raw readings onto a unit-width point series. Each batch is
//! scaled against its own min..max, so the trace always fills the display
//! range regardless of the ADC's absolute level.

use serde::Serialize;

/// Vertical range readings are mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

impl DisplayRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f64 {
        self.min + self.span() / 2.0
    }
}

impl Default for DisplayRange {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// One chart point. `x` is in `[0, 1]`, `y` in the display range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
}

/// Normalize `readings` into a point series.
///
/// - empty input gives an empty series
/// - a single reading sits at `x = 0`
/// - flat input (max == min) is drawn through the middle of the range
pub fn normalize(readings: &[i32], range: DisplayRange) -> Vec<ChartPoint> {
    let (Some(&min), Some(&max)) = (readings.iter().min(), readings.iter().max()) else {
        return Vec::new();
    };

    let last = (readings.len() - 1) as f64;
    // i64 keeps i32::MIN..i32::MAX from overflowing
    let spread = i64::from(max) - i64::from(min);

    readings
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let x = if last > 0.0 { i as f64 / last } else { 0.0 };
            let y = if spread == 0 {
                range.midpoint()
            } else {
                let t = (i64::from(value) - i64::from(min)) as f64 / spread as f64;
                range.min + t * range.span()
            };
            ChartPoint { x, y }
        })
        .collect()
}
