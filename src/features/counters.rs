//! Degraded feature vector from interface byte counters.

use super::{slot, FeatureSource, FeatureVector, FEATURE_COUNT};
use crate::collectors::CounterInterval;

impl FeatureVector {
    /// Only bytes down/up, bitrate and ratio are known; every other slot stays 0.
    /// With nothing uploaded the ratio degenerates to the downloaded byte count.
    pub fn from_counters(interval: &CounterInterval) -> Self {
        let down = interval.down_bytes as f64;
        let up = interval.up_bytes as f64;
        let mut values = [0.0f32; FEATURE_COUNT];
        values[slot::BYTES_DOWN] = down as f32;
        values[slot::BYTES_UP] = up as f32;
        values[slot::BITRATE_DOWN] = if interval.duration_secs > 0.0 {
            (down / interval.duration_secs) as f32
        } else {
            0.0
        };
        values[slot::RATIO_DOWN_UP] = if interval.up_bytes == 0 {
            down as f32
        } else {
            (down / up) as f32
        };
        Self {
            values,
            source: FeatureSource::Counters,
            window_end: interval.timestamp_ms as f64 / 1000.0,
        }
    }
}
