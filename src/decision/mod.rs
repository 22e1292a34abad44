//! Turns the noisy per-tick score stream into a stable verdict.

mod engine;
mod heuristic;

pub use engine::{DecisionEngine, DecisionState, TickOutcome, Verdict};
pub use heuristic::adjust_score;

use crate::features::FeatureSource;
use serde::{Deserialize, Serialize};

/// One update for the presentation sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub session_id: String,
    /// Smoothed score in [0, 1]
    pub score: f32,
    pub is_reel: bool,
    /// Verdict flipped on this tick
    pub transitioned: bool,
    pub source: FeatureSource,
    /// Tick time (ms)
    pub ts_ms: i64,
}

impl DecisionEvent {
    pub fn label(&self) -> &'static str {
        if self.is_reel {
            "REEL DETECTED"
        } else {
            "Normal Traffic"
        }
    }
}
