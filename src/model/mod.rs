//! Scoring: z-score normalization, then a classifier behind the [`ScoringOracle`] boundary.
//!
//! The whole stage is optional. Without artifacts the pipeline still aggregates traffic,
//! it just never scores it.

mod normalizer;
mod onnx;

pub use normalizer::{ConfigLoadError, NormalizationParams, Normalizer};
pub use onnx::OnnxOracle;

use crate::config::ModelConfig;
use crate::features::{FeatureVector, FEATURE_COUNT};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("previous scoring call still running")]
    Busy,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("oracle returned non-finite score {0}")]
    InvalidOutput(f32),
}

/// Maps a normalized vector to a probability in [0, 1]. Must not keep caller-visible state.
pub trait ScoringOracle: Send + Sync {
    fn score(&self, features: &[f32; FEATURE_COUNT]) -> Result<f32, OracleError>;
}

impl<F> ScoringOracle for F
where
    F: Fn(&[f32; FEATURE_COUNT]) -> Result<f32, OracleError> + Send + Sync,
{
    fn score(&self, features: &[f32; FEATURE_COUNT]) -> Result<f32, OracleError> {
        self(features)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageLoadError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// SHA-256 of an artifact file, hex encoded.
pub fn fingerprint(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    let mut h = Sha256::new();
    h.update(&data);
    Ok(format!("{:x}", h.finalize()))
}

/// Normalizer + oracle + per-call time budget.
pub struct InferenceStage {
    normalizer: Normalizer,
    oracle: Arc<dyn ScoringOracle>,
    timeout: Option<Duration>,
    /// Set while an oracle call runs on the blocking pool, including one abandoned
    /// after its budget ran out.
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the blocking call finishes, panics, or is never run.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InferenceStage {
    /// A zero `timeout` disables the budget.
    pub fn new(normalizer: Normalizer, oracle: Arc<dyn ScoringOracle>, timeout: Duration) -> Self {
        Self {
            normalizer,
            oracle,
            timeout: (!timeout.is_zero()).then_some(timeout),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load the scaler and the ONNX model named in `config`.
    pub fn load(config: &ModelConfig) -> Result<Self, StageLoadError> {
        let params = NormalizationParams::load(&config.scaler_path)?;
        let oracle = OnnxOracle::load(&config.model_path)?;
        for path in [&config.scaler_path, &config.model_path] {
            if let Ok(sha256) = fingerprint(path) {
                info!(path = %path.display(), %sha256, "artifact loaded");
            }
        }
        Ok(Self::new(
            Normalizer::new(params),
            Arc::new(oracle),
            Duration::from_millis(config.timeout_ms),
        ))
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalize and score. The oracle runs on the blocking pool; past the budget the call
    /// is abandoned and reported as [`OracleError::Timeout`].
    ///
    /// At most one oracle call exists at a time. While an abandoned call is still running,
    /// further evaluations fail fast with [`OracleError::Busy`] instead of queueing.
    pub async fn evaluate(&self, features: &FeatureVector) -> Result<f32, OracleError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(OracleError::Busy);
        }
        let guard = InFlight(Arc::clone(&self.in_flight));
        let values = self.normalizer.normalize(features).values;
        let oracle = Arc::clone(&self.oracle);
        let call = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            oracle.score(&values)
        });

        let joined = match self.timeout {
            Some(budget) => tokio::time::timeout(budget, call)
                .await
                .map_err(|_| OracleError::Timeout(budget))?,
            None => call.await,
        };
        let score = joined
            .map_err(|e| OracleError::Unavailable(format!("scoring task failed: {e}")))??;

        if !score.is_finite() {
            return Err(OracleError::InvalidOutput(score));
        }
        Ok(score.clamp(0.0, 1.0))
    }
}
