//! Smoothing, hysteresis, debounce and emission gating over the raw score stream.

use crate::config::DecisionConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Normal,
    Reel,
}

/// Mutated only by [`DecisionEngine::tick`]. `None` timestamps and scores mean "never",
/// which lets the first transition and the first emission through unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionState {
    pub smoothed: Option<f32>,
    pub consecutive_above: u32,
    pub consecutive_below: u32,
    pub verdict: Verdict,
    pub last_change_ms: Option<i64>,
    pub last_emitted_score: Option<f32>,
    pub last_emitted_reel: Option<bool>,
    pub last_emit_ms: Option<i64>,
}

impl DecisionState {
    pub fn is_reel(&self) -> bool {
        self.verdict == Verdict::Reel
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub smoothed: f32,
    pub is_reel: bool,
    pub transitioned: bool,
    /// Whether the sink should receive `(smoothed, is_reel)` for this tick
    pub emit: bool,
}

pub struct DecisionEngine {
    config: DecisionConfig,
    state: DecisionState,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        let config = validated(config);
        Self {
            config,
            state: DecisionState::default(),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    pub fn is_reel(&self) -> bool {
        self.state.is_reel()
    }

    /// Feed one raw score observed at `now_ms`.
    pub fn tick(&mut self, raw: f32, now_ms: i64) -> TickOutcome {
        let cfg = &self.config;
        let st = &mut self.state;
        let raw = raw.clamp(0.0, 1.0);

        let smoothed = match st.smoothed {
            None => raw,
            Some(prev) => cfg.alpha * raw + (1.0 - cfg.alpha) * prev,
        };
        st.smoothed = Some(smoothed);

        if smoothed >= cfg.on_threshold {
            st.consecutive_above += 1;
            st.consecutive_below = 0;
        } else if smoothed <= cfg.off_threshold {
            st.consecutive_below += 1;
            st.consecutive_above = 0;
        } else {
            st.consecutive_above = 0;
            st.consecutive_below = 0;
        }

        let held = st
            .last_change_ms
            .map_or(true, |t| now_ms.saturating_sub(t) >= cfg.min_hold_ms);
        let next = match st.verdict {
            Verdict::Normal if st.consecutive_above >= cfg.required_stable => Some(Verdict::Reel),
            Verdict::Reel if st.consecutive_below >= cfg.required_stable => Some(Verdict::Normal),
            _ => None,
        };
        let transitioned = match next {
            Some(v) if held => {
                st.verdict = v;
                st.last_change_ms = Some(now_ms);
                true
            }
            _ => false,
        };

        let spaced = st
            .last_emit_ms
            .map_or(true, |t| now_ms.saturating_sub(t) >= cfg.emit_interval_ms);
        let moved = st
            .last_emitted_score
            .map_or(true, |s| (smoothed - s).abs() >= cfg.emit_min_delta);
        // a flip that landed inside the emission interval, not yet seen by the sink
        let owed =
            cfg.emit_deferred_flip && st.last_emitted_reel.is_some_and(|r| r != st.is_reel());
        let emit = spaced && (moved || transitioned || owed);
        if emit {
            st.last_emitted_score = Some(smoothed);
            st.last_emitted_reel = Some(st.is_reel());
            st.last_emit_ms = Some(now_ms);
        }

        TickOutcome {
            smoothed,
            is_reel: st.is_reel(),
            transitioned,
            emit,
        }
    }
}

fn validated(config: DecisionConfig) -> DecisionConfig {
    let alpha_ok = config.alpha.is_finite() && config.alpha > 0.0 && config.alpha <= 1.0;
    let bands_ok = config.off_threshold.is_finite()
        && config.on_threshold.is_finite()
        && config.off_threshold < config.on_threshold;
    if alpha_ok && bands_ok {
        return config;
    }
    let defaults = DecisionConfig::default();
    warn!(
        alpha = config.alpha,
        on = config.on_threshold,
        off = config.off_threshold,
        "invalid smoothing/hysteresis parameters; using defaults for them"
    );
    DecisionConfig {
        alpha: if alpha_ok { config.alpha } else { defaults.alpha },
        on_threshold: if bands_ok { config.on_threshold } else { defaults.on_threshold },
        off_threshold: if bands_ok { config.off_threshold } else { defaults.off_threshold },
        ..config
    }
}
