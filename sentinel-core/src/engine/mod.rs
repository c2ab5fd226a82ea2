//! `DetectionEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! DetectionEngine::new(config, classifier)   status = Idle
//!     └─► start()          → source open, threads spawned, status = Listening
//!         └─► stop()       → capture joined, worker drained, status = Stopped
//!     └─► shutdown()       → stop if needed, classifier closed
//! ```
//!
//! Calling `start`/`stop` in the wrong state returns an error rather than
//! panicking. A device failure while listening moves the status to `Error`;
//! a finite source running dry moves it to `Stopped`.
//!
//! ## Threading
//!
//! Two OS threads per session: `sentinel-capture` owns the `PcmSource`
//! (opened and dropped there, since `cpal::Stream` is `!Send`) and
//! `sentinel-classify` runs `pipeline::run`. They are connected by a bounded
//! crossbeam channel. Results go out on tokio broadcast channels, which need
//! no runtime to send.

pub mod pipeline;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::audio::{CpalSource, PcmSource};
use crate::capture::{CaptureExit, CaptureWorker, ExitHook, SourceOpener};
use crate::classifier::{AlertPolicy, DangerClassifier};
use crate::error::{Result, SentinelError};
use crate::events::{ClassificationEvent, EngineStatus, EngineStatusEvent};

/// Broadcast channel capacity for slow subscribers.
const BROADCAST_CAP: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Windows that may wait for the worker before capture starts dropping.
    /// Default: 4 (16 s of audio at the reference window length).
    pub channel_capacity: usize,
    pub alert_policy: AlertPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4,
            alert_policy: AlertPolicy::default(),
        }
    }
}

/// Status shared with the capture thread's exit hook.
struct StatusCell {
    status: Mutex<EngineStatus>,
    tx: broadcast::Sender<EngineStatusEvent>,
}

impl StatusCell {
    fn set(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.tx.send(EngineStatusEvent { status, detail });
    }
}

struct Session {
    capture: CaptureWorker,
    worker: JoinHandle<()>,
}

/// `Send + Sync`; wrap in `Arc` to share with async tasks.
pub struct DetectionEngine {
    config: EngineConfig,
    classifier: Arc<DangerClassifier>,
    status: Arc<StatusCell>,
    results_tx: broadcast::Sender<ClassificationEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    session: Mutex<Option<Session>>,
}

impl DetectionEngine {
    pub fn new(config: EngineConfig, classifier: DangerClassifier) -> Self {
        Self::with_shared_classifier(config, Arc::new(classifier))
    }

    /// Build an engine around a classifier that other callers also use.
    pub fn with_shared_classifier(config: EngineConfig, classifier: Arc<DangerClassifier>) -> Self {
        let (results_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            classifier,
            status: Arc::new(StatusCell {
                status: Mutex::new(EngineStatus::Idle),
                tx: status_tx,
            }),
            results_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            session: Mutex::new(None),
        }
    }

    pub fn classifier(&self) -> &Arc<DangerClassifier> {
        &self.classifier
    }

    /// Listen on the default input device.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Listen on `preferred_input_device`, falling back to the default.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        let target_rate = self.classifier.config().sample_rate;
        self.start_with_source(Box::new(move || {
            let source = CpalSource::open(preferred_input_device.as_deref(), target_rate)?;
            Ok(Box::new(source) as Box<dyn PcmSource>)
        }))
    }

    /// Listen on any source. `opener` runs on the capture thread.
    ///
    /// Blocks until the source is open (or failed to open).
    ///
    /// # Errors
    /// - `SentinelError::AlreadyRunning` if a session is active.
    /// - Whatever `opener` returned.
    pub fn start_with_source(&self, opener: SourceOpener) -> Result<()> {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            if active.capture.is_running() {
                return Err(SentinelError::AlreadyRunning);
            }
        }
        // A session whose source ended on its own is reaped here.
        if let Some(stale) = session.take() {
            Self::finish(stale);
        }

        self.diagnostics.reset();
        let detector = self.classifier.config();
        let (windows_tx, windows_rx) =
            crossbeam_channel::bounded::<Vec<f32>>(self.config.channel_capacity.max(1));

        let ctx = pipeline::WorkerContext {
            windows: windows_rx,
            classifier: Arc::clone(&self.classifier),
            alert_policy: self.config.alert_policy,
            results_tx: self.results_tx.clone(),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };
        let worker = std::thread::Builder::new()
            .name("sentinel-classify".into())
            .spawn(move || pipeline::run(ctx))
            .map_err(SentinelError::Io)?;

        let status = Arc::clone(&self.status);
        let on_exit: ExitHook = Box::new(move |exit: &CaptureExit| match exit {
            CaptureExit::Stopped => {}
            CaptureExit::Exhausted => {
                status.set(EngineStatus::Stopped, Some("audio source exhausted".into()))
            }
            CaptureExit::Failed(reason) => status.set(EngineStatus::Error, Some(reason.clone())),
        });

        // Published before the capture thread starts so a source that runs
        // dry immediately still ends on `Stopped`.
        self.status.set(EngineStatus::Listening, None);
        match CaptureWorker::spawn(
            opener,
            detector.num_samples(),
            detector.sample_rate,
            windows_tx,
            Arc::clone(&self.diagnostics),
            on_exit,
        ) {
            Ok(capture) => {
                *session = Some(Session { capture, worker });
                info!(
                    window_samples = detector.num_samples(),
                    sample_rate = detector.sample_rate,
                    "engine started, listening"
                );
                Ok(())
            }
            Err(e) => {
                // The capture thread dropped its sender; the worker exits.
                let _ = worker.join();
                self.status.set(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop capture, drain the worker and release the source.
    ///
    /// # Errors
    /// `SentinelError::NotRunning` if no session is active.
    pub fn stop(&self) -> Result<()> {
        let session = self.session.lock().take().ok_or(SentinelError::NotRunning)?;
        info!("engine stop requested");
        let still_running = session.capture.is_running();
        Self::finish(session);
        if still_running {
            self.status.set(EngineStatus::Stopped, None);
        }
        Ok(())
    }

    fn finish(session: Session) {
        let exit = session.capture.stop();
        if session.worker.join().is_err() {
            warn!("classification worker panicked");
        }
        info!(?exit, "capture session finished");
    }

    /// Stop if needed and close the classifier.
    pub fn shutdown(&self) {
        if self.stop().is_ok() {
            info!("engine stopped during shutdown");
        }
        self.classifier.close();
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.status.lock()
    }

    pub fn is_listening(&self) -> bool {
        self.status() == EngineStatus::Listening
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<ClassificationEvent> {
        self.results_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status.tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }
}

impl Drop for DetectionEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            Self::finish(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    #[test]
    fn stop_without_start_is_not_running() {
        let engine = DetectionEngine::new(
            EngineConfig::default(),
            DangerClassifier::new(DetectorConfig::default()),
        );
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(matches!(engine.stop(), Err(SentinelError::NotRunning)));
    }

    #[test]
    fn failed_open_sets_error_status() {
        let engine = DetectionEngine::new(
            EngineConfig::default(),
            DangerClassifier::new(DetectorConfig::default()),
        );
        let mut status_rx = engine.subscribe_status();
        let err = engine
            .start_with_source(Box::new(|| Err(SentinelError::NoDefaultInputDevice)))
            .unwrap_err();
        assert!(matches!(err, SentinelError::NoDefaultInputDevice));
        assert_eq!(engine.status(), EngineStatus::Error);
        let mut last = None;
        while let Ok(event) = status_rx.try_recv() {
            last = Some(event.status);
        }
        assert_eq!(last, Some(EngineStatus::Error));
        assert!(matches!(engine.stop(), Err(SentinelError::NotRunning)));
    }

    #[test]
    fn shutdown_closes_classifier() {
        let engine = DetectionEngine::new(
            EngineConfig::default(),
            DangerClassifier::new(DetectorConfig::default()),
        );
        engine.shutdown();
        assert_eq!(
            engine.classifier().state(),
            crate::classifier::ClassifierState::Closed
        );
    }
}
