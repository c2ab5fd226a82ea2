//! `LinearModel`: dense two-class head `scores = W·x + b`.
//!
//! Weights live in a small JSON file:
//!
//! ```json
//! { "weights": [[...danger row...], [...safe row...]], "bias": [0.1, -0.1] }
//! ```
//!
//! No runtime dependencies, so packages built on it work without the
//! `onnx` feature.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SentinelError};
use crate::inference::ScoreModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    /// Two rows: danger then safe.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    danger: Vec<f32>,
    safe: Vec<f32>,
    bias: [f32; 2],
}

impl LinearModel {
    pub fn new(danger: Vec<f32>, safe: Vec<f32>, bias: [f32; 2]) -> Result<Self> {
        if danger.is_empty() || danger.len() != safe.len() {
            return Err(SentinelError::ModelFormat(format!(
                "linear head rows must be equal and non-empty, got {} and {}",
                danger.len(),
                safe.len()
            )));
        }
        if !danger
            .iter()
            .chain(&safe)
            .chain(&bias)
            .all(|v| v.is_finite())
        {
            return Err(SentinelError::ModelFormat(
                "linear head contains non-finite parameters".into(),
            ));
        }
        Ok(Self { danger, safe, bias })
    }

    pub fn from_weights(w: LinearWeights) -> Result<Self> {
        let LinearWeights { weights, bias } = w;
        let [danger, safe]: [Vec<f32>; 2] = weights.try_into().map_err(|rows: Vec<Vec<f32>>| {
            SentinelError::ModelFormat(format!("linear head needs 2 rows, got {}", rows.len()))
        })?;
        let bias: [f32; 2] = bias.try_into().map_err(|b: Vec<f32>| {
            SentinelError::ModelFormat(format!("linear head needs 2 biases, got {}", b.len()))
        })?;
        Self::new(danger, safe, bias)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let w: LinearWeights = serde_json::from_str(json)
            .map_err(|e| SentinelError::ModelFormat(format!("linear weights: {e}")))?;
        Self::from_weights(w)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SentinelError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// All-zero head: every window scores a tie and is labelled safe.
    pub fn zeros(input_len: usize) -> Self {
        Self {
            danger: vec![0.0; input_len],
            safe: vec![0.0; input_len],
            bias: [0.0; 2],
        }
    }
}

impl ScoreModel for LinearModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!(input_len = self.danger.len(), "LinearModel::warm_up");
        let zeros = vec![0.0; self.danger.len()];
        self.scores(&zeros).map(|_| ())
    }

    fn scores(&mut self, features: &[f32]) -> Result<[f32; 2]> {
        if features.len() != self.danger.len() {
            return Err(SentinelError::Inference(format!(
                "expected {} features, got {}",
                self.danger.len(),
                features.len()
            )));
        }
        let dot = |row: &[f32]| -> f32 { row.iter().zip(features).map(|(w, x)| w * x).sum() };
        Ok([
            dot(&self.danger) + self.bias[0],
            dot(&self.safe) + self.bias[1],
        ])
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.danger.len())
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
