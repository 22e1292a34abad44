//! Per-session processing: window → normalizer → oracle → decision.
//!
//! Owns every piece of mutable state for one monitoring session. Nothing here is shared;
//! the session loop is the only caller.

use crate::collectors::{CounterInterval, TrafficSample};
use crate::config::{AgentConfig, CounterPolicy};
use crate::decision::{adjust_score, DecisionEngine, DecisionEvent, DecisionState};
use crate::features::{FeatureVector, SlidingWindow};
use crate::model::{InferenceStage, OracleError};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Observations ingested (packets or counter intervals)
    pub samples: u64,
    /// Evaluations that reached the oracle
    pub ticks: u64,
    /// Evaluations discarded because scoring failed or timed out
    pub skipped_ticks: u64,
    pub transitions: u64,
    pub emitted: u64,
}

pub struct Pipeline {
    session_id: String,
    window: SlidingWindow,
    inference: Option<InferenceStage>,
    policy: CounterPolicy,
    engine: DecisionEngine,
    realtime: bool,
    last_eval_secs: Option<f64>,
    stats: PipelineStats,
}

impl Pipeline {
    /// `inference: None` runs the session aggregate-only: samples are still windowed,
    /// nothing is scored and no events are produced.
    pub fn new(config: &AgentConfig, inference: Option<InferenceStage>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            window: SlidingWindow::new(&config.features),
            inference,
            policy: config.counter_policy.clone(),
            engine: DecisionEngine::new(config.decision.clone()),
            realtime: config.realtime.enabled,
            last_eval_secs: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn decision_state(&self) -> &DecisionState {
        self.engine.state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn realtime(&self) -> bool {
        self.realtime
    }

    pub fn set_realtime(&mut self, enabled: bool) {
        if self.realtime != enabled {
            info!(enabled, "real-time evaluation toggled");
        }
        self.realtime = enabled;
    }

    pub fn inference_enabled(&self) -> bool {
        self.inference.is_some()
    }

    pub fn install_inference(&mut self, stage: InferenceStage) {
        info!("inference stage enabled");
        self.inference = Some(stage);
    }

    pub fn disable_inference(&mut self) {
        if self.inference.take().is_some() {
            info!("inference stage disabled");
        }
    }

    fn scoring_active(&self) -> bool {
        self.realtime && self.inference.is_some()
    }

    /// Packet mode. Evaluates at most once per `step_secs` of sample time.
    pub async fn on_sample(&mut self, sample: TrafficSample) -> Option<DecisionEvent> {
        self.stats.samples += 1;
        self.window.add_sample(sample);
        if !self.scoring_active() {
            return None;
        }

        let newest = self.window.newest()?;
        if let Some(last) = self.last_eval_secs {
            if newest - last < self.window.step_secs() {
                return None;
            }
        }
        self.last_eval_secs = Some(newest);

        let features = self.window.compute_features()?;
        let now_ms = (features.window_end * 1000.0).round() as i64;
        self.evaluate(features, now_ms).await
    }

    /// Counter mode. Every interval is one evaluation tick.
    pub async fn on_interval(&mut self, interval: &CounterInterval) -> Option<DecisionEvent> {
        self.stats.samples += 1;
        if !self.scoring_active() {
            return None;
        }
        if !self.policy.score_degraded {
            debug!("counter-only vectors are not scored");
            return None;
        }
        let features = FeatureVector::from_counters(interval);
        self.evaluate(features, interval.timestamp_ms).await
    }

    async fn evaluate(&mut self, features: FeatureVector, now_ms: i64) -> Option<DecisionEvent> {
        let scored = match &self.inference {
            Some(stage) => stage.evaluate(&features).await,
            None => return None,
        };
        self.stats.ticks += 1;

        let raw = match scored {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.skipped_ticks += 1;
                match e {
                    OracleError::Timeout(_) => warn!(error = %e, "scoring timed out; tick skipped"),
                    OracleError::Busy => {
                        debug!("previous scoring call still running; tick skipped")
                    }
                    _ => warn!(error = %e, "scoring failed; tick skipped"),
                }
                return None;
            }
        };

        let adjusted = adjust_score(raw, &features, &self.policy);
        let outcome = self.engine.tick(adjusted, now_ms);
        debug!(raw, adjusted, smoothed = outcome.smoothed, "tick");

        if outcome.transitioned {
            self.stats.transitions += 1;
            info!(
                score = outcome.smoothed,
                is_reel = outcome.is_reel,
                ts_ms = now_ms,
                "verdict changed"
            );
        }
        if !outcome.emit {
            return None;
        }
        self.stats.emitted += 1;
        Some(DecisionEvent {
            session_id: self.session_id.clone(),
            score: outcome.smoothed,
            is_reel: outcome.is_reel,
            transitioned: outcome.transitioned,
            source: features.source,
            ts_ms: now_ms,
        })
    }
}
