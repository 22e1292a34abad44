//! Sliding-window aggregation: samples → trailing time window → 13-slot vector.

use super::{slot, FeatureSource, FeatureVector, FEATURE_COUNT};
use crate::collectors::{Direction, TrafficSample};
use crate::config::FeaturesConfig;
use std::collections::VecDeque;
use tracing::trace;

/// Samples older than `RETENTION_FACTOR × window` behind the newest one are evicted.
pub const RETENTION_FACTOR: f64 = 10.0;

/// Download packets above this size count as a burst.
const BURST_MIN_BYTES: u64 = 1000;

pub struct SlidingWindow {
    window_secs: f64,
    step_secs: f64,
    /// Ordered by timestamp.
    samples: VecDeque<TrafficSample>,
}

impl SlidingWindow {
    pub fn new(config: &FeaturesConfig) -> Self {
        let defaults = FeaturesConfig::default();
        let window_secs = if config.window_secs.is_finite() && config.window_secs > 0.0 {
            config.window_secs
        } else {
            defaults.window_secs
        };
        let step_secs = if config.step_secs.is_finite() && config.step_secs >= 0.0 {
            config.step_secs
        } else {
            defaults.step_secs
        };
        Self {
            window_secs,
            step_secs,
            samples: VecDeque::new(),
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Advisory re-evaluation cadence; does not affect the computed features.
    pub fn step_secs(&self) -> f64 {
        self.step_secs
    }

    pub fn retention_secs(&self) -> f64 {
        RETENTION_FACTOR * self.window_secs
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn newest(&self) -> Option<f64> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn oldest(&self) -> Option<f64> {
        self.samples.front().map(|s| s.timestamp)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Insert a sample and evict everything past the retention horizon.
    /// Late arrivals are placed in timestamp order; ones already past the horizon are dropped.
    pub fn add_sample(&mut self, sample: TrafficSample) {
        if !sample.timestamp.is_finite() {
            trace!(ts = sample.timestamp, "ignoring sample with non-finite timestamp");
            return;
        }
        let newest = self
            .newest()
            .map_or(sample.timestamp, |n| n.max(sample.timestamp));
        let cutoff = newest - self.retention_secs();
        if sample.timestamp < cutoff {
            trace!(ts = sample.timestamp, cutoff, "dropping sample behind retention horizon");
            return;
        }

        match self.samples.back() {
            Some(last) if sample.timestamp < last.timestamp => {
                let at = self
                    .samples
                    .partition_point(|s| s.timestamp <= sample.timestamp);
                self.samples.insert(at, sample);
            }
            _ => self.samples.push_back(sample),
        }

        while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Features over `[newest − window, newest]`. `None` when no samples are retained.
    pub fn compute_features(&self) -> Option<FeatureVector> {
        let end = self.newest()?;
        let start = end - self.window_secs;
        let first = self.samples.partition_point(|s| s.timestamp < start);
        if first == self.samples.len() {
            return None;
        }

        let mut bytes_down = 0.0f64;
        let mut count_down = 0u64;
        let mut bytes_up = 0.0f64;
        let mut count_up = 0u64;
        let mut bursts = 0u64;
        let mut prev_down_ts: Option<f64> = None;
        let mut iat_sum = 0.0f64;
        let mut iat_n = 0u64;

        for s in self.samples.range(first..) {
            match s.direction {
                Direction::Download => {
                    bytes_down += s.byte_len as f64;
                    count_down += 1;
                    if s.byte_len > BURST_MIN_BYTES {
                        bursts += 1;
                    }
                    if let Some(prev) = prev_down_ts {
                        iat_sum += s.timestamp - prev;
                        iat_n += 1;
                    }
                    prev_down_ts = Some(s.timestamp);
                }
                Direction::Upload => {
                    bytes_up += s.byte_len as f64;
                    count_up += 1;
                }
            }
        }

        let mean = |total: f64, n: u64| if n > 0 { total / n as f64 } else { 0.0 };

        let mut values = [0.0f32; FEATURE_COUNT];
        values[slot::BYTES_DOWN] = bytes_down as f32;
        values[slot::COUNT_DOWN] = count_down as f32;
        values[slot::AVG_SIZE_DOWN] = mean(bytes_down, count_down) as f32;
        values[slot::BYTES_UP] = bytes_up as f32;
        values[slot::COUNT_UP] = count_up as f32;
        values[slot::AVG_SIZE_UP] = mean(bytes_up, count_up) as f32;
        values[slot::BITRATE_DOWN] = (bytes_down / self.window_secs) as f32;
        values[slot::IAT_MEAN_DOWN] = mean(iat_sum, iat_n) as f32;
        values[slot::BURST_COUNT_DOWN] = bursts as f32;
        values[slot::RATIO_DOWN_UP] = (bytes_down / (bytes_up + 1.0)) as f32;

        Some(FeatureVector {
            values,
            source: FeatureSource::Packets,
            window_end: end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(secs: f64) -> SlidingWindow {
        SlidingWindow::new(&FeaturesConfig {
            window_secs: secs,
            ..FeaturesConfig::default()
        })
    }

    #[test]
    fn empty_window_yields_none() {
        assert!(window(5.0).compute_features().is_none());
    }

    #[test]
    fn computes_all_slots() {
        let mut w = window(5.0);
        w.add_sample(TrafficSample::download(10.0, 1500));
        w.add_sample(TrafficSample::upload(10.5, 100));
        w.add_sample(TrafficSample::download(11.0, 500));
        w.add_sample(TrafficSample::download(13.0, 1200));
        w.add_sample(TrafficSample::upload(14.0, 99));

        let fv = w.compute_features().unwrap();
        assert_eq!(fv.values[slot::BYTES_DOWN], 3200.0);
        assert_eq!(fv.values[slot::COUNT_DOWN], 3.0);
        assert!((fv.values[slot::AVG_SIZE_DOWN] - 3200.0 / 3.0).abs() < 1e-3);
        assert_eq!(fv.values[slot::BYTES_UP], 199.0);
        assert_eq!(fv.values[slot::COUNT_UP], 2.0);
        assert_eq!(fv.values[slot::AVG_SIZE_UP], 99.5);
        assert_eq!(fv.values[slot::BITRATE_DOWN], 640.0);
        // gaps 1.0 and 2.0
        assert_eq!(fv.values[slot::IAT_MEAN_DOWN], 1.5);
        assert_eq!(fv.values[slot::BURST_COUNT_DOWN], 2.0);
        assert_eq!(fv.values[slot::RATIO_DOWN_UP], 16.0);
        for reserved in [3, 7, 10] {
            assert_eq!(fv.values[reserved], 0.0);
        }
        assert_eq!(fv.window_end, 14.0);
        assert_eq!(fv.source, FeatureSource::Packets);
    }

    #[test]
    fn window_excludes_older_retained_samples() {
        let mut w = window(5.0);
        w.add_sample(TrafficSample::download(0.0, 9_999));
        w.add_sample(TrafficSample::download(10.0, 10));
        assert_eq!(w.len(), 2);
        let fv = w.compute_features().unwrap();
        assert_eq!(fv.values[slot::BYTES_DOWN], 10.0);
        assert_eq!(fv.values[slot::IAT_MEAN_DOWN], 0.0);
    }

    #[test]
    fn window_start_is_inclusive() {
        let mut w = window(5.0);
        w.add_sample(TrafficSample::download(5.0, 100));
        w.add_sample(TrafficSample::download(10.0, 100));
        assert_eq!(w.compute_features().unwrap().values[slot::COUNT_DOWN], 2.0);
    }

    #[test]
    fn zero_traffic_ratio_is_zero() {
        let mut w = window(5.0);
        w.add_sample(TrafficSample::upload(1.0, 0));
        let fv = w.compute_features().unwrap();
        assert_eq!(fv.values[slot::BYTES_DOWN], 0.0);
        assert_eq!(fv.values[slot::BYTES_UP], 0.0);
        assert_eq!(fv.values[slot::RATIO_DOWN_UP], 0.0);
        assert_eq!(fv.values[slot::AVG_SIZE_DOWN], 0.0);
    }

    #[test]
    fn retention_bounded_by_newest_sample() {
        let mut w = window(2.0);
        // deterministic jittered, partly out-of-order timestamps
        let mut seed: u64 = 0x5eed;
        let mut t = 0.0f64;
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let jitter = ((seed >> 33) % 1000) as f64 / 1000.0;
            t += 0.05;
            let ts = if seed % 7 == 0 { t - 30.0 * jitter } else { t };
            let dir = if seed % 3 == 0 { Direction::Upload } else { Direction::Download };
            w.add_sample(TrafficSample::new(ts, seed % 1500, dir));

            let newest = w.newest().unwrap();
            let oldest = w.oldest().unwrap();
            assert!(newest - oldest <= w.retention_secs());
        }
        assert!(w.len() < 1_100);
    }

    #[test]
    fn out_of_order_samples_are_ordered() {
        let mut w = window(5.0);
        w.add_sample(TrafficSample::download(3.0, 100));
        w.add_sample(TrafficSample::download(1.0, 100));
        w.add_sample(TrafficSample::download(2.0, 100));
        let fv = w.compute_features().unwrap();
        assert_eq!(fv.values[slot::IAT_MEAN_DOWN], 1.0);
        assert_eq!(w.oldest(), Some(1.0));
        assert_eq!(w.newest(), Some(3.0));
    }

    #[test]
    fn stale_and_non_finite_samples_dropped() {
        let mut w = window(1.0);
        w.add_sample(TrafficSample::download(100.0, 1));
        w.add_sample(TrafficSample::download(50.0, 1));
        w.add_sample(TrafficSample::download(f64::NAN, 1));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn features_are_deterministic() {
        let mut w = window(5.0);
        for i in 0..200 {
            let ts = i as f64 * 0.037;
            w.add_sample(TrafficSample::download(ts, 700 + (i % 9) * 113));
            if i % 4 == 0 {
                w.add_sample(TrafficSample::upload(ts + 0.001, 60));
            }
        }
        let a = w.compute_features().unwrap();
        let b = w.compute_features().unwrap();
        let bits = |fv: &FeatureVector| fv.values.map(f32::to_bits);
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn invalid_window_falls_back_to_default() {
        let w = window(-1.0);
        assert_eq!(w.window_secs(), FeaturesConfig::default().window_secs);
    }
}
