//! Static detector configuration.
//!
//! Every stage of the feature pipeline derives its shape from a single
//! `DetectorConfig`. The defaults reproduce the reference deployment the
//! bundled models were trained against:
//!
//! | Parameter          | Value       |
//! |--------------------|-------------|
//! | Sample rate        | 22 050 Hz   |
//! | Window duration    | 4.0 s       |
//! | Samples per window | 88 200      |
//! | FFT / frame size   | 2 048       |
//! | Hop                | 512         |
//! | Mel filters        | 40          |
//! | Mel range          | 20–8 000 Hz |
//! | Cepstral coeffs    | 13          |
//! | Pre-emphasis       | 0.97        |
//! | Silence RMS        | 0.02        |

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_DURATION_SECS: f32 = 4.0;
pub const DEFAULT_FRAME_SIZE: usize = 2_048;
pub const DEFAULT_HOP_SIZE: usize = 512;
pub const DEFAULT_NUM_FILTERS: usize = 40;
pub const DEFAULT_NUM_COEFFICIENTS: usize = 13;
pub const DEFAULT_LOW_FREQ_HZ: f32 = 20.0;
pub const DEFAULT_HIGH_FREQ_HZ: f32 = 8_000.0;
pub const DEFAULT_PRE_EMPHASIS: f32 = 0.97;
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct DetectorConfig {
    /// Sample rate the model was trained at (Hz).
    pub sample_rate: u32,
    /// Length of one classification window in seconds.
    pub duration_secs: f32,
    /// Analysis frame length; must be a power of two.
    pub frame_size: usize,
    /// Frame advance in samples.
    pub hop_size: usize,
    pub num_filters: usize,
    pub num_coefficients: usize,
    pub low_freq_hz: f32,
    pub high_freq_hz: f32,
    pub pre_emphasis: f32,
    /// RMS below which a window is reported as silent.
    pub silence_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            duration_secs: DEFAULT_DURATION_SECS,
            frame_size: DEFAULT_FRAME_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            num_filters: DEFAULT_NUM_FILTERS,
            num_coefficients: DEFAULT_NUM_COEFFICIENTS,
            low_freq_hz: DEFAULT_LOW_FREQ_HZ,
            high_freq_hz: DEFAULT_HIGH_FREQ_HZ,
            pre_emphasis: DEFAULT_PRE_EMPHASIS,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    /// Samples per classification window (`NUM_SAMPLES`).
    pub fn num_samples(&self) -> usize {
        (self.sample_rate as f64 * self.duration_secs as f64) as usize
    }

    /// Length of the model input: per-coefficient means followed by stds.
    pub fn feature_len(&self) -> usize {
        self.num_coefficients * 2
    }

    /// Number of power-spectrum bins per frame.
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Reject shapes the pipeline cannot process.
    ///
    /// Called once at initialization; a failure here is fatal and must not
    /// be worked around at classification time.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(config_err("sample rate must be positive"));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(config_err(format!(
                "window duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.frame_size < 2 || !self.frame_size.is_power_of_two() {
            return Err(config_err(format!(
                "frame size {} is not a power of two",
                self.frame_size
            )));
        }
        if self.hop_size == 0 {
            return Err(config_err("hop size must be positive"));
        }
        if self.num_samples() < self.frame_size {
            return Err(config_err(format!(
                "window of {} samples is shorter than one {}-sample frame",
                self.num_samples(),
                self.frame_size
            )));
        }
        if self.num_filters == 0 {
            return Err(config_err("at least one mel filter is required"));
        }
        if self.num_coefficients == 0 || self.num_coefficients > self.num_filters {
            return Err(config_err(format!(
                "num_coefficients must be in 1..={}, got {}",
                self.num_filters, self.num_coefficients
            )));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.low_freq_hz >= 0.0
            && self.low_freq_hz < self.high_freq_hz
            && self.high_freq_hz <= nyquist)
        {
            return Err(config_err(format!(
                "mel range {}..{} Hz must satisfy 0 <= low < high <= {nyquist}",
                self.low_freq_hz, self.high_freq_hz
            )));
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return Err(config_err(format!(
                "pre-emphasis coefficient {} outside [0, 1)",
                self.pre_emphasis
            )));
        }
        if !(self.silence_threshold.is_finite() && self.silence_threshold >= 0.0) {
            return Err(config_err("silence threshold must be a non-negative number"));
        }
        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> SentinelError {
    SentinelError::Configuration(msg.into())
}
