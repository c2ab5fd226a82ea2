use thiserror::Error;

/// All errors produced by sentinel-core.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("unsupported or corrupt model: {0}")]
    ModelFormat(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("signal of {len} samples is shorter than one {frame_size}-sample frame")]
    InputTooShort { len: usize, frame_size: usize },

    #[error("inference error: {0}")]
    Inference(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("WAV error: {0}")]
    Wav(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<hound::Error> for SentinelError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => SentinelError::Io(io),
            other => SentinelError::Wav(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
