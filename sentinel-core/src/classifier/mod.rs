//! `DangerClassifier`: the full window → decision pipeline behind a
//! lifecycle state machine.
//!
//! ```text
//! Uninitialized ──initialize──▶ Initializing ──ok──▶ Ready ──close──▶ Closed
//!                                    │
//!                                    └──err──▶ Failed(reason) ──initialize──▶ …
//! ```
//!
//! In `Ready` each `classify` call is independent: pre-emphasis, trim/pad,
//! silence gate, MFCC, aggregation, normalization, inference, softmax.
//! All methods take `&self`, so one classifier can be shared by `Arc`
//! between the engine worker and offline callers.

pub mod result;

pub use result::{AlertPolicy, ClassificationResult};

use std::path::Path;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::audio::wav::load_wav_resampled;
use crate::config::DetectorConfig;
use crate::dsp::{self, MfccExtractor, NormalizationStats};
use crate::error::{Result, SentinelError};
use crate::inference::{decide, ModelHandle, ModelPackage, Prediction, ScoreModel};
use crate::vad::{EnergyGate, GateDecision};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Closed,
}

/// Everything a ready classifier needs; dropped as a unit on `close`.
struct Pipeline {
    extractor: MfccExtractor,
    gate: EnergyGate,
    stats: NormalizationStats,
    model: ModelHandle,
}

enum State {
    Uninitialized,
    Initializing,
    Ready(Box<Pipeline>),
    Failed(String),
    Closed,
}

impl State {
    fn kind(&self) -> ClassifierState {
        match self {
            State::Uninitialized => ClassifierState::Uninitialized,
            State::Initializing => ClassifierState::Initializing,
            State::Ready(_) => ClassifierState::Ready,
            State::Failed(_) => ClassifierState::Failed,
            State::Closed => ClassifierState::Closed,
        }
    }
}

pub struct DangerClassifier {
    config: DetectorConfig,
    state: RwLock<State>,
}

impl DangerClassifier {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::Uninitialized),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> ClassifierState {
        self.state.read().kind()
    }

    /// Reason for the last initialization failure, if in `Failed`.
    pub fn failure_reason(&self) -> Option<String> {
        match &*self.state.read() {
            State::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Load and validate the package at `manifest_path`, then initialize.
    pub fn load(&self, manifest_path: &Path) -> Result<()> {
        self.run_initialization(|| {
            let package = ModelPackage::load(manifest_path, self.config.num_coefficients)?;
            let model = package.open_model()?;
            Ok((model, package.normalization))
        })
    }

    /// Initialize from an already validated package.
    pub fn initialize(&self, package: &ModelPackage) -> Result<()> {
        self.run_initialization(|| {
            let model = package.open_model()?;
            Ok((model, package.normalization.clone()))
        })
    }

    /// Initialize with an explicit backend and statistics.
    pub fn initialize_with(&self, model: ModelHandle, stats: NormalizationStats) -> Result<()> {
        self.run_initialization(move || Ok((model, stats)))
    }

    fn run_initialization<F>(&self, acquire: F) -> Result<()>
    where
        F: FnOnce() -> Result<(ModelHandle, NormalizationStats)>,
    {
        {
            let mut state = self.state.write();
            match &*state {
                State::Closed => {
                    return Err(SentinelError::Configuration(
                        "classifier has been closed".into(),
                    ))
                }
                State::Initializing => {
                    return Err(SentinelError::Configuration(
                        "classifier is already initializing".into(),
                    ))
                }
                _ => {}
            }
            // Any previous pipeline is released here.
            *state = State::Initializing;
        }

        let started = Instant::now();
        let outcome = acquire().and_then(|(model, stats)| self.build_pipeline(model, stats));

        let mut state = self.state.write();
        if matches!(*state, State::Closed) {
            // `close` won the race; drop whatever was built.
            return Err(SentinelError::Configuration(
                "classifier closed during initialization".into(),
            ));
        }
        match outcome {
            Ok(pipeline) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    num_samples = self.config.num_samples(),
                    feature_len = self.config.feature_len(),
                    "danger classifier ready"
                );
                *state = State::Ready(Box::new(pipeline));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "danger classifier initialization failed");
                *state = State::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn build_pipeline(&self, model: ModelHandle, stats: NormalizationStats) -> Result<Pipeline> {
        self.config.validate()?;
        stats.validate(self.config.num_coefficients)?;
        let extractor = MfccExtractor::new(&self.config)?;

        {
            let mut guard = model.0.lock();
            if let Some(len) = guard.input_len() {
                if len != self.config.feature_len() {
                    return Err(SentinelError::Configuration(format!(
                        "{} model takes {len} inputs, features have {}",
                        guard.name(),
                        self.config.feature_len()
                    )));
                }
            }
            guard.warm_up()?;
        }

        Ok(Pipeline {
            extractor,
            gate: EnergyGate::new(self.config.silence_threshold),
            stats,
            model,
        })
    }

    /// Classify one window of samples in [-1, 1].
    ///
    /// Never fails: pipeline problems are folded into the result.
    pub fn classify(&self, samples: &[f32]) -> ClassificationResult {
        self.classify_measured(samples).0
    }

    /// Like `classify`, also returning the RMS the silence gate measured
    /// (zero when the classifier is not ready).
    pub fn classify_measured(&self, samples: &[f32]) -> (ClassificationResult, f32) {
        let state = self.state.read();
        let pipeline = match &*state {
            State::Ready(p) => p,
            State::Failed(reason) => {
                return (
                    ClassificationResult::Error {
                        reason: reason.clone(),
                    },
                    0.0,
                )
            }
            _ => return (ClassificationResult::NotInitialized, 0.0),
        };

        let started = Instant::now();
        let emphasized = dsp::pre_emphasis(samples, self.config.pre_emphasis);
        let signal = dsp::fit_length(emphasized, self.config.num_samples());

        let (decision, rms) = pipeline.gate.check(&signal);
        if decision == GateDecision::Silent {
            debug!(rms, "window below silence threshold");
            return (ClassificationResult::Silent, rms);
        }

        let result = match self.infer(pipeline, &signal) {
            Ok(prediction) => ClassificationResult::from(prediction),
            Err(e) => {
                warn!(error = %e, "classification failed");
                ClassificationResult::error(e)
            }
        };
        debug!(
            ?result,
            rms,
            elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
            "window classified"
        );
        (result, rms)
    }

    fn infer(&self, pipeline: &Pipeline, signal: &[f32]) -> Result<Prediction> {
        let mfcc = pipeline.extractor.extract(signal)?;
        let features = dsp::feature_vector(&mfcc, &pipeline.stats);
        let scores = pipeline.model.scores(features.as_slice())?;
        decide(scores)
    }

    /// Decode a WAV file, resample it to the detector rate and classify it
    /// as a single window (trimmed or padded like live audio).
    ///
    /// # Errors
    /// Only decoding failures; classification outcomes are in the result.
    pub fn classify_wav(&self, path: &Path) -> Result<ClassificationResult> {
        let samples = load_wav_resampled(path, self.config.sample_rate)?;
        Ok(self.classify(&samples))
    }

    /// Release the model. Terminal: later calls return `NotInitialized`.
    pub fn close(&self) {
        let mut state = self.state.write();
        if !matches!(*state, State::Closed) {
            info!("danger classifier closed");
        }
        *state = State::Closed;
    }
}

impl std::fmt::Debug for DangerClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DangerClassifier")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
