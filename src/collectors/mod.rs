//! Traffic collectors: per-packet metadata or periodic byte counters.
//! Exactly one mode is active per session; both are reached through [`TrafficSource`].

mod packet;
mod network;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub use packet::{parse_capture_row, parse_ip_header, PacketMeta, PacketSource};
pub use network::{ByteCounters, CounterInterval, CounterPoller, CounterReader, SysinfoCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Download,
    Upload,
}

/// One directional byte-transfer observation. `timestamp` is in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub timestamp: f64,
    pub byte_len: u64,
    pub direction: Direction,
}

impl TrafficSample {
    pub fn new(timestamp: f64, byte_len: u64, direction: Direction) -> Self {
        Self {
            timestamp,
            byte_len,
            direction,
        }
    }

    pub fn download(timestamp: f64, byte_len: u64) -> Self {
        Self::new(timestamp, byte_len, Direction::Download)
    }

    pub fn upload(timestamp: f64, byte_len: u64) -> Self {
        Self::new(timestamp, byte_len, Direction::Upload)
    }
}

/// An observation that could not be turned into a [`TrafficSample`]. Always dropped, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("empty packet")]
    Empty,
    #[error("packet too short for IPv{version} header ({len} bytes)")]
    Truncated { version: u8, len: usize },
    #[error("unsupported IP version {0}")]
    UnsupportedVersion(u8),
    #[error("capture row {line}: {reason}")]
    BadRow { line: u64, reason: String },
}

/// Failure of the source itself (cannot be acquired, or its reader broke).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("traffic source I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("byte counters unavailable: {0}")]
    CountersUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    Sample(TrafficSample),
    Interval(CounterInterval),
}

/// The two acquisition strategies, selected once at session start.
pub enum TrafficSource {
    Packets(PacketSource),
    Counters(CounterPoller),
}

impl TrafficSource {
    pub fn mode(&self) -> &'static str {
        match self {
            TrafficSource::Packets(_) => "packets",
            TrafficSource::Counters(_) => "counters",
        }
    }

    /// Next observation; `None` once the source is exhausted (end of a replay or closed reader).
    pub async fn next(&mut self) -> Result<Option<SourceEvent>, SourceError> {
        match self {
            TrafficSource::Packets(p) => Ok(p.next_sample().await?.map(SourceEvent::Sample)),
            TrafficSource::Counters(c) => Ok(Some(SourceEvent::Interval(c.poll_interval().await))),
        }
    }

    /// (malformed, foreign) packet counts; zero in counter mode.
    pub fn drop_counts(&self) -> (u64, u64) {
        match self {
            TrafficSource::Packets(p) => (p.malformed(), p.foreign()),
            TrafficSource::Counters(_) => (0, 0),
        }
    }
}

/// Wall-clock anchored, monotonic session clock. Follows tokio's (pausable) time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall_base_ms: i64,
    base: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            wall_base_ms: Utc::now().timestamp_millis(),
            base: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.wall_base_ms + self.base.elapsed().as_millis() as i64
    }

    pub fn now_secs(&self) -> f64 {
        self.wall_base_ms as f64 / 1000.0 + self.base.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}
