//! Traffic feature extraction: sliding-window packet statistics, or the degraded counter vector.
//!
//! The slot order in [`FEATURE_LAYOUT`] is shared with the normalization artifact and the
//! trained model. Reordering it silently breaks both.

mod window;
mod counters;

pub use window::{SlidingWindow, RETENTION_FACTOR};

use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 13;

/// Slot names, in vector order. `std_*` and `iat_std_down` are reserved (always 0 live).
pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [
    "bytes_down",
    "pkt_count_down",
    "avg_pkt_size_down",
    "std_pkt_size_down",
    "bytes_up",
    "pkt_count_up",
    "avg_pkt_size_up",
    "std_pkt_size_up",
    "bitrate_down",
    "iat_mean_down",
    "iat_std_down",
    "burst_count_down",
    "ratio_down_up",
];

/// Slot indices into [`FeatureVector::values`].
pub mod slot {
    pub const BYTES_DOWN: usize = 0;
    pub const COUNT_DOWN: usize = 1;
    pub const AVG_SIZE_DOWN: usize = 2;
    pub const BYTES_UP: usize = 4;
    pub const COUNT_UP: usize = 5;
    pub const AVG_SIZE_UP: usize = 6;
    pub const BITRATE_DOWN: usize = 8;
    pub const IAT_MEAN_DOWN: usize = 9;
    pub const BURST_COUNT_DOWN: usize = 11;
    pub const RATIO_DOWN_UP: usize = 12;
}

/// Which acquisition path produced a vector. The two paths fill different slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    Packets,
    Counters,
}

/// Fixed 13-slot model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f32; FEATURE_COUNT],
    pub source: FeatureSource,
    /// Window end (packets) or poll time (counters), seconds.
    pub window_end: f64,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Value at a [`slot`] index; `None` past [`FEATURE_COUNT`].
    pub fn get(&self, slot: usize) -> Option<f32> {
        self.values.get(slot).copied()
    }

    /// Downstream bitrate in bits per second.
    pub fn bitrate_down_bps(&self) -> f64 {
        self.values[slot::BITRATE_DOWN] as f64 * 8.0
    }

    pub fn down_up_ratio(&self) -> f64 {
        self.values[slot::RATIO_DOWN_UP] as f64
    }
}
