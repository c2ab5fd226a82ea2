//! RMS energy gate.
//!
//! Stateless: a window is silent iff it is empty or
//! `sqrt(mean(x²)) < threshold`. There is no hangover; each window is a
//! separate four-second decision.

use super::GateDecision;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyGate {
    /// RMS amplitude below which a window is silent. Default `0.02`.
    threshold: f32,
}

impl EnergyGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Root-mean-square of `samples`, accumulated in f64. Zero for empty input.
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }

    /// Gate a window, returning the decision and the measured RMS.
    pub fn check(&self, samples: &[f32]) -> (GateDecision, f32) {
        let rms = Self::rms(samples);
        let decision = if samples.is_empty() || rms < self.threshold {
            GateDecision::Silent
        } else {
            GateDecision::Active
        };
        (decision, rms)
    }

    pub fn is_silent(&self, samples: &[f32]) -> bool {
        self.check(samples).0.is_silent()
    }
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SILENCE_THRESHOLD)
    }
}
