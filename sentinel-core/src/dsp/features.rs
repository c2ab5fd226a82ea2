//! Time aggregation and z-score normalization of MFCC matrices.

use serde::{Deserialize, Serialize};

use super::mfcc::MfccMatrix;
use crate::error::{Result, SentinelError};

/// Per-coefficient training statistics bundled with a model package.
///
/// One mean and one std per cepstral coefficient. Both halves of the
/// feature vector are normalized with the same pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl NormalizationStats {
    /// Zero mean, unit std. Leaves features untouched.
    pub fn identity(num_coefficients: usize) -> Self {
        Self {
            mean: vec![0.0; num_coefficients],
            std: vec![1.0; num_coefficients],
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Checked once at package load; after this, `normalize` cannot divide by
    /// zero or index out of range.
    pub fn validate(&self, num_coefficients: usize) -> Result<()> {
        if self.mean.len() != num_coefficients || self.std.len() != num_coefficients {
            return Err(SentinelError::Configuration(format!(
                "normalization statistics have {} means and {} stds, expected {num_coefficients} of each",
                self.mean.len(),
                self.std.len()
            )));
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(SentinelError::Configuration(format!(
                "normalization mean[{i}] is not finite"
            )));
        }
        if let Some(i) = self
            .std
            .iter()
            .position(|s| !(s.is_finite() && *s > 0.0))
        {
            return Err(SentinelError::Configuration(format!(
                "normalization std[{i}] = {} must be a positive finite number",
                self.std[i]
            )));
        }
        Ok(())
    }
}

/// `[means..., stds...]` of one window, length `2 × num_coefficients`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mean and population standard deviation of every coefficient over time.
pub fn aggregate(mfcc: &MfccMatrix) -> FeatureVector {
    let n = mfcc.num_coefficients();
    let frames = mfcc.num_frames().max(1) as f64;
    let mut out = vec![0f32; n * 2];

    for c in 0..n {
        let row = mfcc.coefficient(c);
        let mean = row.iter().map(|&v| v as f64).sum::<f64>() / frames;
        let var = row
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / frames;
        out[c] = mean as f32;
        out[n + c] = var.sqrt() as f32;
    }

    FeatureVector(out)
}

/// `(v - mean[c]) / std[c]` applied to both the mean entry `c` and the std
/// entry `n + c` of every coefficient. `stats` must have been validated
/// against `n = features.len() / 2`.
pub fn normalize(features: &mut FeatureVector, stats: &NormalizationStats) {
    let n = features.len() / 2;
    debug_assert_eq!(n, stats.len());
    let (means, stds) = features.0.split_at_mut(n);
    for (c, (m, s)) in stats.mean.iter().zip(&stats.std).enumerate().take(n) {
        means[c] = (means[c] - m) / s;
        stds[c] = (stds[c] - m) / s;
    }
}

/// Aggregate then normalize.
pub fn feature_vector(mfcc: &MfccMatrix, stats: &NormalizationStats) -> FeatureVector {
    let mut features = aggregate(mfcc);
    normalize(&mut features, stats);
    features
}
