//! # sentinel-core
//!
//! Reusable audio danger-classification SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CpalSource → SPSC RingBuffer → resample → i16 PCM
//!                                                          │
//!                                 capture thread: WindowAccumulator (4 s)
//!                                                          │ bounded channel
//!                                 worker thread: DangerClassifier::classify
//!                                                          │
//!     pre-emphasis → trim/pad → RMS gate → MFCC → mean/std → z-score → model → softmax
//!                                                          │
//!                                        broadcast::Sender<ClassificationEvent>
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on the capture and
//! worker threads. `DangerClassifier` is usable on its own for offline files.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod vad;

// Convenience re-exports for downstream crates
pub use classifier::{AlertPolicy, ClassificationResult, ClassifierState, DangerClassifier};
pub use config::DetectorConfig;
pub use engine::{DetectionEngine, EngineConfig};
pub use error::{Result, SentinelError};
pub use events::{ClassificationEvent, EngineStatus, EngineStatusEvent};
pub use inference::{Label, LinearModel, ModelHandle, ModelPackage, Probabilities, ScoreModel};

#[cfg(feature = "onnx")]
pub use inference::OnnxModel;
