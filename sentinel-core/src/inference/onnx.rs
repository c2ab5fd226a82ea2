//! `OnnxModel`: two-class classifier graph served by ONNX Runtime.
//!
//! Expected graph contract: one float input `[1, 2n]` (normalized feature
//! vector) and one float output `[1, 2]` holding `(danger, safe)` scores.
//! Input and output names are read from the graph rather than assumed.
//!
//! Environment:
//! - `SENTINEL_ORT_INTRA_THREADS`: intra-op thread count (default 1..=4
//!   depending on cores; the graph is tiny).

use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::{debug, info};

use crate::error::{Result, SentinelError};
use crate::inference::ScoreModel;

fn ort_err(e: impl std::fmt::Display) -> SentinelError {
    SentinelError::OnnxSession(e.to_string())
}

fn create_session(model_path: &Path) -> Result<Session> {
    let logical_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    let intra_threads = std::env::var("SENTINEL_ORT_INTRA_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(logical_cores.clamp(1, 4))
        .clamp(1, 16);

    let builder = SessionBuilder::new()
        .map_err(ort_err)?
        .with_intra_threads(intra_threads)
        .map_err(ort_err)?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(ort_err)?;
    info!(intra_threads, logical_cores, "ONNX session threading configured");

    builder.commit_from_file(model_path).map_err(ort_err)
}

pub struct OnnxModel {
    path: PathBuf,
    input_len: usize,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    /// Describe a model; the session is created by `warm_up`.
    pub fn new(path: impl Into<PathBuf>, input_len: usize) -> Self {
        Self {
            path: path.into(),
            input_len,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&mut self, features: &[f32]) -> Result<[f32; 2]> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SentinelError::Inference("ONNX session not loaded".into()))?;

        let input = Array2::<f32>::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(ort_err)?;
        let input_val = Value::from_array(input).map_err(ort_err)?;
        let inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), input_val.into())];

        let outputs = session.run(inputs).map_err(ort_err)?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            SentinelError::Inference(format!("model produced no output named {}", self.output_name))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(ort_err)?;

        match data {
            [danger, safe, ..] => Ok([*danger, *safe]),
            _ => Err(SentinelError::Inference(format!(
                "model output has {} values, expected 2",
                data.len()
            ))),
        }
    }
}

impl ScoreModel for OnnxModel {
    fn warm_up(&mut self) -> Result<()> {
        info!("=== Sentinel ONNX Model Startup Report ===");
        if !self.path.exists() {
            info!("  {:?}: NOT FOUND", self.path);
            return Err(SentinelError::ModelNotFound {
                path: self.path.clone(),
            });
        }
        let size_kb = std::fs::metadata(&self.path)
            .map(|m| m.len() as f64 / 1024.0)
            .unwrap_or(0.0);
        info!("  {:?}: {:.1} KB", self.path, size_kb);

        let session = create_session(&self.path)?;
        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        info!("  inputs: {:?}", input_names);
        info!("  outputs: {:?}", output_names);

        self.input_name = input_names
            .first()
            .cloned()
            .ok_or_else(|| SentinelError::ModelFormat("ONNX graph has no inputs".into()))?;
        self.output_name = output_names
            .first()
            .cloned()
            .ok_or_else(|| SentinelError::ModelFormat("ONNX graph has no outputs".into()))?;
        self.session = Some(session);

        let dummy = vec![0.0f32; self.input_len];
        let scores = self.run(&dummy)?;
        debug!(?scores, "ONNX warm-up inference");
        info!("=== ONNX model ready ===");
        Ok(())
    }

    fn scores(&mut self, features: &[f32]) -> Result<[f32; 2]> {
        if features.len() != self.input_len {
            return Err(SentinelError::Inference(format!(
                "expected {} features, got {}",
                self.input_len,
                features.len()
            )));
        }
        self.run(features)
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.input_len)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
