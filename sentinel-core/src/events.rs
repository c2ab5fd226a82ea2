//! Event types broadcast by `DetectionEngine`.
//!
//! All types serialize to camelCase JSON with lowercase enum tags so hosts
//! can forward them verbatim (the CLI prints them one per line).

use serde::{Deserialize, Serialize};

use crate::classifier::ClassificationResult;

/// One classified capture window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationEvent {
    /// Monotonically increasing across the engine's lifetime.
    pub seq: u64,
    pub result: ClassificationResult,
    /// RMS of the processed window, as seen by the silence gate.
    pub rms: f32,
    /// `true` when the alert policy fired for this window.
    pub alert: bool,
    /// Time spent classifying the window.
    pub latency_ms: f64,
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, never started.
    Idle,
    /// Capturing and classifying.
    Listening,
    /// Capture stopped or source exhausted; may be restarted.
    Stopped,
    /// The capture device failed.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Probabilities;

    #[test]
    fn classification_event_serializes_camel_case() {
        let event = ClassificationEvent {
            seq: 3,
            result: ClassificationResult::Danger {
                confidence: 0.875,
                probabilities: Probabilities {
                    danger: 0.875,
                    safe: 0.125,
                },
            },
            rms: 0.5,
            alert: true,
            latency_ms: 12.5,
        };
        let json = serde_json::to_value(&event).expect("serialize classification event");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["result"]["kind"], "danger");
        assert_eq!(json["result"]["confidence"], 0.875);
        assert_eq!(json["alert"], true);
        assert_eq!(json["latencyMs"], 12.5);
    }

    #[test]
    fn silent_event_has_no_confidence() {
        let event = ClassificationEvent {
            seq: 0,
            result: ClassificationResult::Silent,
            rms: 0.0,
            alert: false,
            latency_ms: 0.1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["result"]["kind"], "silent");
        assert!(json["result"].get("confidence").is_none());
    }

    #[test]
    fn engine_status_uses_lowercase_names() {
        let event = EngineStatusEvent {
            status: EngineStatus::Listening,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "listening");
        assert!(json["detail"].is_null());

        let parsed: EngineStatusEvent =
            serde_json::from_str(r#"{"status":"error","detail":"device unplugged"}"#)
                .expect("deserialize status event");
        assert_eq!(parsed.status, EngineStatus::Error);
        assert_eq!(parsed.detail.as_deref(), Some("device unplugged"));
    }
}
