//! Model package: a JSON manifest bundling the scoring model with the
//! normalization statistics it was trained against.
//!
//! ```json
//! {
//!   "format": "onnx",
//!   "model": "danger_classifier.onnx",
//!   "normalization": { "mean": [ ...13 values... ], "std": [ ...13 values... ] }
//! }
//! ```
//!
//! One mean/std pair per cepstral coefficient; the model itself takes
//! twice as many inputs. `model` is resolved relative to the manifest's
//! directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dsp::NormalizationStats;
use crate::error::{Result, SentinelError};
use crate::inference::{LinearModel, ModelHandle, ScoreModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub format: ModelFormat,
    pub model: PathBuf,
    pub normalization: NormalizationStats,
}

/// A validated package, ready to open.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPackage {
    pub format: ModelFormat,
    pub model_path: PathBuf,
    pub normalization: NormalizationStats,
}

impl ModelPackage {
    /// Read and validate a manifest for a detector with `num_coefficients`
    /// cepstral coefficients.
    ///
    /// # Errors
    /// - `ModelNotFound` if the manifest or the model file is missing.
    /// - `Configuration` for a malformed manifest or bad statistics.
    pub fn load(manifest_path: &Path, num_coefficients: usize) -> Result<Self> {
        if !manifest_path.exists() {
            return Err(SentinelError::ModelNotFound {
                path: manifest_path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(manifest_path)?;
        let manifest: PackageManifest = serde_json::from_str(&raw).map_err(|e| {
            SentinelError::Configuration(format!(
                "invalid package manifest {}: {e}",
                manifest_path.display()
            ))
        })?;
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_manifest(manifest, base, num_coefficients)
    }

    pub fn from_manifest(
        manifest: PackageManifest,
        base: &Path,
        num_coefficients: usize,
    ) -> Result<Self> {
        manifest.normalization.validate(num_coefficients)?;
        let model_path = if manifest.model.is_absolute() {
            manifest.model
        } else {
            base.join(manifest.model)
        };
        if !model_path.exists() {
            return Err(SentinelError::ModelNotFound { path: model_path });
        }

        info!(
            format = ?manifest.format,
            model = %model_path.display(),
            num_coefficients,
            "model package validated"
        );
        Ok(Self {
            format: manifest.format,
            model_path,
            normalization: manifest.normalization,
        })
    }

    /// Instantiate the backend. The caller is responsible for `warm_up`.
    pub fn open_model(&self) -> Result<ModelHandle> {
        let feature_len = self.normalization.len() * 2;
        match self.format {
            ModelFormat::Linear => {
                let model = LinearModel::from_file(&self.model_path)?;
                let input_len = model.input_len().unwrap_or(0);
                if input_len != feature_len {
                    return Err(SentinelError::Configuration(format!(
                        "linear head takes {input_len} inputs, features have {feature_len}"
                    )));
                }
                Ok(ModelHandle::new(model))
            }
            #[cfg(feature = "onnx")]
            ModelFormat::Onnx => Ok(ModelHandle::new(crate::inference::OnnxModel::new(
                &self.model_path,
                feature_len,
            ))),
            #[cfg(not(feature = "onnx"))]
            ModelFormat::Onnx => Err(SentinelError::ModelFormat(
                "ONNX packages need sentinel-core built with the `onnx` feature".into(),
            )),
        }
    }
}

/// `SENTINEL_PACKAGE`, else `<data dir>/sentinel/model/package.json`.
pub fn default_package_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("SENTINEL_PACKAGE") {
        return PathBuf::from(explicit);
    }
    data_dir().join("sentinel").join("model").join("package.json")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share"))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
