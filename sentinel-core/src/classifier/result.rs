use serde::{Deserialize, Serialize};

use crate::inference::{Label, Prediction, Probabilities};

/// Outcome of classifying one window.
///
/// Serialized with a `kind` tag, e.g.
/// `{"kind":"danger","confidence":0.91,"probabilities":{"danger":0.91,"safe":0.09}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassificationResult {
    Danger {
        confidence: f32,
        probabilities: Probabilities,
    },
    Safe {
        confidence: f32,
        probabilities: Probabilities,
    },
    /// Empty window or energy below the silence threshold.
    Silent,
    /// Classifier not ready (never initialized, still loading, or closed).
    NotInitialized,
    Error {
        reason: String,
    },
}

impl ClassificationResult {
    pub fn label(&self) -> Option<Label> {
        match self {
            Self::Danger { .. } => Some(Label::Danger),
            Self::Safe { .. } => Some(Label::Safe),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Danger { confidence, .. } | Self::Safe { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }

    pub fn probabilities(&self) -> Option<Probabilities> {
        match self {
            Self::Danger { probabilities, .. } | Self::Safe { probabilities, .. } => {
                Some(*probabilities)
            }
            _ => None,
        }
    }

    pub fn is_danger(&self) -> bool {
        matches!(self, Self::Danger { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub(crate) fn error(reason: impl std::fmt::Display) -> Self {
        Self::Error {
            reason: reason.to_string(),
        }
    }
}

impl From<Prediction> for ClassificationResult {
    fn from(p: Prediction) -> Self {
        match p.label {
            Label::Danger => Self::Danger {
                confidence: p.confidence,
                probabilities: p.probabilities,
            },
            Label::Safe => Self::Safe {
                confidence: p.confidence,
                probabilities: p.probabilities,
            },
        }
    }
}

/// Whether a result warrants alerting the user.
///
/// Only `Danger` results at or above `sensitivity` alert; a sensitivity of
/// `0.5` alerts on every danger decision, `1.0` practically never.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPolicy {
    pub sensitivity: f32,
}

impl AlertPolicy {
    pub const DEFAULT_SENSITIVITY: f32 = 0.7;

    pub fn new(sensitivity: f32) -> Self {
        let sensitivity = if sensitivity.is_finite() {
            sensitivity.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_SENSITIVITY
        };
        Self { sensitivity }
    }

    /// `SENTINEL_SENSITIVITY` when set and parseable, else the default.
    pub fn from_env() -> Self {
        std::env::var("SENTINEL_SENSITIVITY")
            .ok()
            .and_then(|v| v.trim().parse::<f32>().ok())
            .map(Self::new)
            .unwrap_or_default()
    }

    pub fn should_alert(&self, result: &ClassificationResult) -> bool {
        match result {
            ClassificationResult::Danger { confidence, .. } => *confidence >= self.sensitivity,
            _ => false,
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SENSITIVITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn danger(confidence: f32) -> ClassificationResult {
        ClassificationResult::Danger {
            confidence,
            probabilities: Probabilities {
                danger: confidence,
                safe: 1.0 - confidence,
            },
        }
    }

    #[test]
    fn alerts_only_on_confident_danger() {
        let policy = AlertPolicy::new(0.8);
        assert!(policy.should_alert(&danger(0.8)));
        assert!(policy.should_alert(&danger(0.95)));
        assert!(!policy.should_alert(&danger(0.79)));
        assert!(!policy.should_alert(&ClassificationResult::Safe {
            confidence: 0.99,
            probabilities: Probabilities {
                danger: 0.01,
                safe: 0.99
            },
        }));
        assert!(!policy.should_alert(&ClassificationResult::Silent));
    }

    #[test]
    fn sensitivity_is_clamped() {
        assert_eq!(AlertPolicy::new(3.0).sensitivity, 1.0);
        assert_eq!(AlertPolicy::new(-1.0).sensitivity, 0.0);
        assert_eq!(
            AlertPolicy::new(f32::NAN).sensitivity,
            AlertPolicy::DEFAULT_SENSITIVITY
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(danger(0.75)).unwrap();
        assert_eq!(json["kind"], "danger");
        assert_eq!(json["probabilities"]["safe"], 0.25);

        let json = serde_json::to_value(ClassificationResult::NotInitialized).unwrap();
        assert_eq!(json["kind"], "notInitialized");

        let back: ClassificationResult =
            serde_json::from_str(r#"{"kind":"error","reason":"boom"}"#).unwrap();
        assert_eq!(back, ClassificationResult::error("boom"));
    }

    #[test]
    fn accessors_match_variant() {
        let r = danger(0.9);
        assert_eq!(r.label(), Some(Label::Danger));
        assert_eq!(r.confidence(), Some(0.9));
        assert!(r.is_danger());
        assert_eq!(ClassificationResult::Silent.label(), None);
    }
}
