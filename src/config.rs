//! Agent configuration. JSON file, every section optional; defaults are the tuned constants.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Traffic source selection
    pub source: SourceConfig,
    /// Sliding window parameters
    pub features: FeaturesConfig,
    /// Model and normalization artifacts
    pub model: ModelConfig,
    /// Smoothing, hysteresis, debounce and emission gates
    pub decision: DecisionConfig,
    /// How degraded (counter-only) vectors are scored
    pub counter_policy: CounterPolicy,
    /// Initial state of real-time evaluation
    pub realtime: RealtimeConfig,
    pub output: OutputConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Poll interface byte counters (degraded features)
    Counters,
    /// Replay a packet capture CSV (`ts,length,src,dst`)
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Local device address; packet direction is inferred against it
    pub device_addr: IpAddr,
    /// Counter poll interval (milliseconds)
    pub poll_interval_ms: u64,
    pub replay_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Trailing window length (seconds)
    pub window_secs: f64,
    /// Minimum spacing between packet-mode evaluations (seconds)
    pub step_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to ONNX classifier
    pub model_path: PathBuf,
    /// Path to normalization parameters (`mean`, `scale`/`std`)
    pub scaler_path: PathBuf,
    /// Per-call scoring budget (milliseconds)
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// EMA weight of the newest score
    pub alpha: f32,
    /// Smoothed score at or above this counts toward REEL
    pub on_threshold: f32,
    /// Smoothed score at or below this counts toward NORMAL
    pub off_threshold: f32,
    /// Consecutive qualifying ticks needed for a transition
    pub required_stable: u32,
    /// Minimum time between transitions (milliseconds)
    pub min_hold_ms: i64,
    /// Minimum time between emitted updates (milliseconds)
    pub emit_interval_ms: i64,
    /// Minimum score change worth emitting without a transition
    pub emit_min_delta: f32,
    /// Also emit on the first open tick after a verdict flip that fell inside the
    /// emission interval. Off: only a delta or a same-tick transition passes the gate.
    pub emit_deferred_flip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterPolicy {
    /// Run the model on counter-only vectors at all
    pub score_degraded: bool,
    /// Apply the bitrate boost/penalty before smoothing
    pub heuristic: bool,
    pub boost_min_bps: f64,
    pub boost_min_ratio: f64,
    pub boost: f32,
    pub penalty_max_bps: f64,
    pub penalty: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write decision events to stdout as JSON lines instead of log records
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Counters,
            device_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            poll_interval_ms: 1000,
            replay_path: None,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            step_secs: 1.0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.onnx"),
            scaler_path: PathBuf::from("scaler.json"),
            timeout_ms: 250,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            on_threshold: 0.7,
            off_threshold: 0.4,
            required_stable: 2,
            min_hold_ms: 4000,
            emit_interval_ms: 1000,
            emit_min_delta: 0.02,
            emit_deferred_flip: false,
        }
    }
}

impl Default for CounterPolicy {
    fn default() -> Self {
        Self {
            score_degraded: true,
            heuristic: true,
            boost_min_bps: 1_500_000.0,
            boost_min_ratio: 3.0,
            boost: 0.15,
            penalty_max_bps: 150_000.0,
            penalty: 0.10,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AgentConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AgentConfig>(&data) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed config; using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable config; using defaults");
                Self::default()
            }
        }
    }
}
