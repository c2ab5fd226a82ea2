//! Classification worker loop and run diagnostics.
//!
//! ```text
//! capture thread ──try_send──▶ bounded channel ──recv──▶ worker
//!                                                         │ classify_measured
//!                                                         │ alert policy
//!                                                         ▼
//!                                            broadcast<ClassificationEvent>
//! ```
//!
//! The worker processes windows FIFO and exits once the capture side drops
//! its sender and the channel is drained.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::classifier::{AlertPolicy, ClassificationResult, DangerClassifier};
use crate::events::ClassificationEvent;

/// Counters shared by the capture thread and the worker.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub windows_captured: AtomicUsize,
    pub windows_dropped: AtomicUsize,
    pub windows_classified: AtomicUsize,
    pub silent: AtomicUsize,
    pub danger: AtomicUsize,
    pub safe: AtomicUsize,
    pub errors: AtomicUsize,
    pub alerts: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            windows_captured: self.windows_captured.load(Ordering::Relaxed),
            windows_dropped: self.windows_dropped.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            silent: self.silent.load(Ordering::Relaxed),
            danger: self.danger.load(Ordering::Relaxed),
            safe: self.safe.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }

    /// Count one classified window.
    pub fn record(&self, result: &ClassificationResult, alert: bool) {
        self.windows_classified.fetch_add(1, Ordering::Relaxed);
        let bucket = match result {
            ClassificationResult::Danger { .. } => &self.danger,
            ClassificationResult::Safe { .. } => &self.safe,
            ClassificationResult::Silent => &self.silent,
            ClassificationResult::NotInitialized | ClassificationResult::Error { .. } => {
                &self.errors
            }
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        if alert {
            self.alerts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicUsize; 8] {
        [
            &self.windows_captured,
            &self.windows_dropped,
            &self.windows_classified,
            &self.silent,
            &self.danger,
            &self.safe,
            &self.errors,
            &self.alerts,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub windows_captured: usize,
    pub windows_dropped: usize,
    pub windows_classified: usize,
    pub silent: usize,
    pub danger: usize,
    pub safe: usize,
    pub errors: usize,
    pub alerts: usize,
}

/// Everything the worker needs, passed as one struct so the spawn stays tidy.
pub struct WorkerContext {
    pub windows: Receiver<Vec<f32>>,
    pub classifier: Arc<DangerClassifier>,
    pub alert_policy: AlertPolicy,
    pub results_tx: broadcast::Sender<ClassificationEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Classify windows until the channel disconnects.
pub fn run(ctx: WorkerContext) {
    info!("classification worker started");

    for window in ctx.windows.iter() {
        let started = Instant::now();
        let (result, rms) = ctx.classifier.classify_measured(&window);
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let alert = ctx.alert_policy.should_alert(&result);
        ctx.diagnostics.record(&result, alert);

        let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
        if alert {
            warn!(
                seq,
                confidence = result.confidence().unwrap_or_default(),
                "danger detected"
            );
        } else {
            debug!(seq, ?result, rms, latency_ms, "window classified");
        }

        // No subscribers is fine; events are fire-and-forget.
        let _ = ctx.results_tx.send(ClassificationEvent {
            seq,
            result,
            rms,
            alert,
            latency_ms,
        });
    }

    let snapshot = ctx.diagnostics.snapshot();
    info!(
        captured = snapshot.windows_captured,
        dropped = snapshot.windows_dropped,
        classified = snapshot.windows_classified,
        danger = snapshot.danger,
        alerts = snapshot.alerts,
        "classification worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Probabilities;

    #[test]
    fn record_buckets_results() {
        let d = PipelineDiagnostics::default();
        d.record(&ClassificationResult::Silent, false);
        d.record(
            &ClassificationResult::Danger {
                confidence: 0.9,
                probabilities: Probabilities {
                    danger: 0.9,
                    safe: 0.1,
                },
            },
            true,
        );
        d.record(&ClassificationResult::NotInitialized, false);
        let s = d.snapshot();
        assert_eq!(s.windows_classified, 3);
        assert_eq!((s.silent, s.danger, s.safe, s.errors, s.alerts), (1, 1, 0, 1, 1));

        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn worker_drains_channel_then_exits() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let (results_tx, mut results_rx) = broadcast::channel(16);
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        // Uninitialized classifier: every window is NotInitialized.
        let ctx = WorkerContext {
            windows: rx,
            classifier: Arc::new(DangerClassifier::new(Default::default())),
            alert_policy: AlertPolicy::default(),
            results_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };

        tx.send(vec![0.0; 16]).unwrap();
        tx.send(vec![0.0; 16]).unwrap();
        drop(tx);
        run(ctx);

        let first = results_rx.try_recv().unwrap();
        let second = results_rx.try_recv().unwrap();
        assert_eq!((first.seq, second.seq), (0, 1));
        assert_eq!(first.result, ClassificationResult::NotInitialized);
        assert!(!first.alert);
        assert_eq!(diagnostics.snapshot().errors, 2);
    }
}
