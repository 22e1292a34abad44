//! ONNX Runtime oracle. Input: `[1, 13]` f32, output: one sigmoid probability
//! (or a two-class softmax, in which case the positive class is taken).

use super::{OracleError, ScoringOracle};
use crate::features::FEATURE_COUNT;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub struct OnnxOracle {
    session: Mutex<Session>,
    output_name: String,
    path: PathBuf,
}

impl OnnxOracle {
    pub fn load(path: &Path) -> Result<Self, OracleError> {
        if !path.exists() {
            return Err(OracleError::Unavailable(format!(
                "model not found at {}",
                path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| OracleError::Unavailable(format!("session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| OracleError::Unavailable(format!("optimization level: {e}")))?
            .commit_from_file(path)
            .map_err(|e| OracleError::Unavailable(format!("load {}: {e}", path.display())))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| OracleError::Unavailable("model declares no outputs".to_string()))?;

        info!(path = %path.display(), output = %output_name, "ONNX model loaded");
        Ok(Self {
            session: Mutex::new(session),
            output_name,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScoringOracle for OnnxOracle {
    fn score(&self, features: &[f32; FEATURE_COUNT]) -> Result<f32, OracleError> {
        let input = Array2::from_shape_vec((1, FEATURE_COUNT), features.to_vec())
            .map_err(|e| OracleError::Inference(format!("input shape: {e}")))?;
        let tensor =
            Value::from_array(input).map_err(|e| OracleError::Inference(format!("tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| OracleError::Unavailable("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| OracleError::Inference(format!("missing output {}", self.output_name)))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| OracleError::Inference(format!("extract: {e}")))?;

        match data {
            [p] => Ok(*p),
            [.., positive] => Ok(*positive),
            [] => Err(OracleError::Inference("empty output tensor".to_string())),
        }
    }
}
