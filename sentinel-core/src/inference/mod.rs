//! Two-class scoring backends and the danger/safe decision rule.
//!
//! The `ScoreModel` trait decouples the classifier from any specific backend
//! (dense linear head, ONNX graph). `scores` takes `&mut self` because ORT
//! sessions run mutably; all calls are therefore serialised through
//! `ModelHandle`'s `parking_lot::Mutex`.

pub mod linear;
pub mod package;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use linear::LinearModel;
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
pub use package::{ModelFormat, ModelPackage};

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// Contract for classification backends.
///
/// Input is one normalized feature vector (`[1, 2n]`); output is the raw
/// `(danger, safe)` score pair, before softmax.
pub trait ScoreModel: Send + 'static {
    /// One-time warm-up, e.g. a dummy inference to populate caches.
    /// Called once while the classifier initializes.
    ///
    /// # Errors
    /// Returns an error if the model cannot run at all.
    fn warm_up(&mut self) -> Result<()>;

    /// Raw scores `[danger, safe]` for one feature vector.
    fn scores(&mut self, features: &[f32]) -> Result<[f32; 2]>;

    /// Expected feature length, if the backend knows it.
    fn input_len(&self) -> Option<usize> {
        None
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Thread-safe reference-counted handle to any `ScoreModel` implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn ScoreModel>>);

impl ModelHandle {
    pub fn new<M: ScoreModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }

    pub fn scores(&self, features: &[f32]) -> Result<[f32; 2]> {
        self.0.lock().scores(features)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Danger,
    Safe,
}

/// Softmax probability of each class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probabilities {
    pub danger: f32,
    pub safe: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Probability of `label`, in `[0.5, 1.0]`.
    pub confidence: f32,
    pub probabilities: Probabilities,
}

/// Numerically stable two-way softmax.
pub fn softmax(scores: [f32; 2]) -> [f32; 2] {
    let max = scores[0].max(scores[1]);
    let e0 = ((scores[0] - max) as f64).exp();
    let e1 = ((scores[1] - max) as f64).exp();
    let sum = e0 + e1;
    [(e0 / sum) as f32, (e1 / sum) as f32]
}

/// Apply softmax and pick the winning class. Ties go to `Safe`.
///
/// # Errors
/// `SentinelError::Inference` if either score is NaN or infinite.
pub fn decide(scores: [f32; 2]) -> Result<Prediction> {
    if !scores.iter().all(|s| s.is_finite()) {
        return Err(SentinelError::Inference(format!(
            "model produced non-finite scores {scores:?}"
        )));
    }
    let [danger, safe] = softmax(scores);
    let probabilities = Probabilities { danger, safe };
    let prediction = if danger > safe {
        Prediction {
            label: Label::Danger,
            confidence: danger,
            probabilities,
        }
    } else {
        Prediction {
            label: Label::Safe,
            confidence: safe,
            probabilities,
        }
    };
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn softmax_sums_to_one() {
        for scores in [[0.0, 0.0], [3.0, -1.0], [-50.0, 40.0], [1e4, 1e4 - 1.0]] {
            let [a, b] = softmax(scores);
            assert_abs_diff_eq!(a + b, 1.0, epsilon = 1e-6);
            assert!((0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b));
        }
    }

    #[test]
    fn softmax_handles_large_scores() {
        let [a, b] = softmax([1_000.0, 0.0]);
        assert_abs_diff_eq!(a, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn tie_goes_to_safe() {
        let p = decide([2.0, 2.0]).unwrap();
        assert_eq!(p.label, Label::Safe);
        assert_abs_diff_eq!(p.confidence, 0.5);
    }

    #[test]
    fn higher_danger_score_wins() {
        let p = decide([2.0, 0.0]).unwrap();
        assert_eq!(p.label, Label::Danger);
        assert!(p.confidence > 0.5 && p.confidence <= 1.0);
        assert_abs_diff_eq!(p.confidence, p.probabilities.danger);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        assert!(matches!(
            decide([f32::NAN, 0.0]),
            Err(SentinelError::Inference(_))
        ));
        assert!(decide([0.0, f32::INFINITY]).is_err());
    }
}
