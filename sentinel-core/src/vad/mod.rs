//! Silence gating.
//!
//! Windows whose energy is below the configured floor never reach feature
//! extraction; they are reported as `Silent` directly.

pub mod energy;

pub use energy::EnergyGate;

/// Outcome of gating one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Enough energy to be worth classifying.
    Active,
    /// Empty or below the RMS threshold.
    Silent,
}

impl GateDecision {
    pub fn is_silent(self) -> bool {
        self == GateDecision::Silent
    }
}
