//! Linear z-score transform with parameters from the training scaler.

use crate::features::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("cannot read normalization params {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed normalization params: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid normalization params: {0}")]
    Invalid(String),
}

/// Scaler artifact. `scale` may be spelled `std`, and may be absent (all 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    pub mean: Vec<f32>,
    #[serde(default, alias = "std", skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f32>>,
}

impl NormalizationParams {
    pub fn from_json(data: &str) -> Result<Self, ConfigLoadError> {
        let params: NormalizationParams = serde_json::from_str(data)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.mean.is_empty() {
            return Err(ConfigLoadError::Invalid("empty `mean`".to_string()));
        }
        let scale_len = self.scale.as_ref().map(Vec::len);
        if self.mean.len() != FEATURE_COUNT || scale_len.is_some_and(|n| n != FEATURE_COUNT) {
            warn!(
                mean = self.mean.len(),
                scale = ?scale_len,
                expected = FEATURE_COUNT,
                "normalization params do not match feature layout; missing slots default to identity"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Normalizer {
    pub fn new(params: NormalizationParams) -> Self {
        Self {
            mean: params.mean,
            scale: params.scale.unwrap_or_default(),
        }
    }

    /// Passes values through unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    #[inline]
    fn apply(&self, i: usize, x: f32) -> f32 {
        let m = self.mean.get(i).copied().unwrap_or(0.0);
        let s = match self.scale.get(i) {
            Some(&s) if s != 0.0 => s,
            _ => 1.0,
        };
        (x - m) / s
    }

    /// `(x[i] − mean[i]) / scale[i]`; missing mean is 0, missing or zero scale is 1.
    pub fn normalize_values(&self, values: &[f32]) -> Vec<f32> {
        values
            .iter()
            .enumerate()
            .map(|(i, &x)| self.apply(i, x))
            .collect()
    }

    pub fn normalize(&self, features: &FeatureVector) -> FeatureVector {
        FeatureVector {
            values: std::array::from_fn(|i| self.apply(i, features.values[i])),
            source: features.source,
            window_end: features.window_end,
        }
    }
}
