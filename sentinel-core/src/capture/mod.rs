//! Capture thread: reads PCM from a `PcmSource`, cuts it into windows and
//! hands them to the classification worker.
//!
//! The source is opened, read and dropped on this thread only (cpal streams
//! are `!Send`). The opener's result is reported back to `spawn` through a
//! sync channel, so a failed device open surfaces as an `Err` from the
//! caller's `start`.
//!
//! Windows are offered with `try_send`: if the worker is still busy and the
//! bounded channel is full, the window is dropped and counted. Capture never
//! blocks on classification.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error, info, warn};

use crate::audio::PcmSource;
use crate::buffering::WindowAccumulator;
use crate::engine::pipeline::PipelineDiagnostics;
use crate::error::{Result, SentinelError};

/// Samples requested from the source per read.
const READ_CHUNK: usize = 1_024;

/// Opens a source on the capture thread.
pub type SourceOpener = Box<dyn FnOnce() -> Result<Box<dyn PcmSource>> + Send + 'static>;

/// Why the capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureExit {
    /// `stop` was requested, or the worker went away.
    Stopped,
    /// A finite source delivered its last sample.
    Exhausted,
    /// The source returned an error.
    Failed(String),
}

/// Called once on the capture thread, after the source has been dropped.
pub type ExitHook = Box<dyn FnOnce(&CaptureExit) + Send + 'static>;

pub struct CaptureWorker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<CaptureExit>>,
}

impl CaptureWorker {
    /// Start the capture thread and wait until the source is open.
    ///
    /// # Errors
    /// Whatever `opener` returned, or `Configuration` if the source runs at a
    /// rate other than `sample_rate`.
    pub fn spawn(
        opener: SourceOpener,
        window_len: usize,
        sample_rate: u32,
        windows: Sender<Vec<f32>>,
        diagnostics: Arc<PipelineDiagnostics>,
        on_exit: ExitHook,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (open_tx, open_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("sentinel-capture".into())
            .spawn(move || {
                let source = match opener() {
                    Ok(s) if s.sample_rate() != sample_rate => {
                        let _ = open_tx.send(Err(SentinelError::Configuration(format!(
                            "source delivers {} Hz, detector expects {sample_rate} Hz",
                            s.sample_rate()
                        ))));
                        return CaptureExit::Failed("sample rate mismatch".into());
                    }
                    Ok(s) => {
                        let _ = open_tx.send(Ok(()));
                        s
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let _ = open_tx.send(Err(e));
                        return CaptureExit::Failed(reason);
                    }
                };

                let exit = capture_loop(source, window_len, &thread_running, &windows, &diagnostics);
                thread_running.store(false, Ordering::Release);
                info!(?exit, "capture thread finished");
                on_exit(&exit);
                exit
            })
            .map_err(SentinelError::Io)?;

        match open_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SentinelError::Other(anyhow::anyhow!(
                    "capture thread died before opening its source"
                )))
            }
        }
    }

    /// `false` once the loop has ended for any reason.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the loop to stop and wait for the thread. The in-flight read
    /// completes and the source is released on the capture thread.
    pub fn stop(mut self) -> CaptureExit {
        self.running.store(false, Ordering::Release);
        self.join()
    }

    fn join(&mut self) -> CaptureExit {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(exit)) => exit,
            Some(Err(_)) => CaptureExit::Failed("capture thread panicked".into()),
            None => CaptureExit::Stopped,
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.running.store(false, Ordering::Release);
            let _ = self.join();
        }
    }
}

fn capture_loop(
    mut source: Box<dyn PcmSource>,
    window_len: usize,
    running: &AtomicBool,
    windows: &Sender<Vec<f32>>,
    diagnostics: &PipelineDiagnostics,
) -> CaptureExit {
    let mut accumulator = WindowAccumulator::new(window_len);
    let mut buf = vec![0i16; READ_CHUNK];

    let exit = loop {
        if !running.load(Ordering::Acquire) {
            break CaptureExit::Stopped;
        }

        let n = match source.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                error!("capture read failed: {e}");
                break CaptureExit::Failed(e.to_string());
            }
        };
        if n == 0 {
            if source.is_exhausted() {
                break CaptureExit::Exhausted;
            }
            std::thread::yield_now();
            continue;
        }

        let Some(window) = accumulator.push(&buf[..n]) else {
            continue;
        };
        diagnostics.windows_captured.fetch_add(1, Ordering::Relaxed);
        match windows.try_send(window) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = diagnostics.windows_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "classifier behind, dropped capture window");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("window receiver gone");
                break CaptureExit::Stopped;
            }
        }
    };

    // Release the device here, on the thread that opened it.
    drop(source);
    exit
}
