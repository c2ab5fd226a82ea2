//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Input devices and WAV files rarely run at the detector's 22.05 kHz.
//! `RateConverter` bridges that gap on the capture thread (streaming) and
//! `resample_buffer` does the same for a whole decoded file.
//!
//! When both rates match, `RateConverter` is a passthrough and no rubato
//! session is created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{Result, SentinelError};

/// Input frames per rubato call.
pub const RESAMPLE_CHUNK: usize = 1_024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input carried between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `SentinelError::Configuration` if either rate is zero or rubato
    /// rejects the ratio.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 || chunk_size == 0 {
            return Err(SentinelError::Configuration(format!(
                "cannot resample {source_rate} Hz -> {target_rate} Hz in chunks of {chunk_size}"
            )));
        }
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| SentinelError::Configuration(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        debug!(source_rate, target_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples, returning whatever output is ready (may be empty).
    ///
    /// Input is accumulated until a full `chunk_size` block is available;
    /// the remainder waits for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Output frames of latency the resampler adds at the start.
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample a complete mono signal, compensating for resampler delay.
///
/// The result has `round(len × target / source)` samples.
pub fn resample_buffer(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let mut rc = RateConverter::new(source_rate, target_rate, RESAMPLE_CHUNK)?;
    let expected =
        (samples.len() as f64 * target_rate as f64 / source_rate as f64).round() as usize;
    let delay = rc.output_delay();

    let mut out = rc.process(samples);
    let silence = vec![0f32; RESAMPLE_CHUNK];
    while out.len() < delay + expected {
        let tail = rc.process(&silence);
        if tail.is_empty() {
            break;
        }
        out.extend_from_slice(&tail);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(22_050, 22_050, RESAMPLE_CHUNK).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn ratio_44k_to_22k_halves_length() {
        let mut rc = RateConverter::new(44_100, 22_050, 1_024).unwrap();
        assert!(!rc.is_passthrough());
        let out = rc.process(&vec![0.0f32; 1_024]);
        assert!(
            (out.len() as isize - 512).unsigned_abs() <= 10,
            "output len={}",
            out.len()
        );
    }

    #[test]
    fn partial_chunk_is_held_back() {
        let mut rc = RateConverter::new(48_000, 22_050, 1_024).unwrap();
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        assert!(!rc.process(&vec![0.0f32; 600]).is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 22_050, 1_024).is_err());
    }

    #[test]
    fn whole_buffer_has_exact_length() {
        let input: Vec<f32> = (0..48_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin())
            .collect();
        let out = resample_buffer(&input, 48_000, 22_050).unwrap();
        assert_eq!(out.len(), 22_050);

        let short = resample_buffer(&input[..100], 48_000, 22_050).unwrap();
        assert_eq!(short.len(), 46);
    }

    #[test]
    fn whole_buffer_preserves_tone_level() {
        let input: Vec<f32> = (0..16_000)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16_000.0).sin())
            .collect();
        let out = resample_buffer(&input, 16_000, 22_050).unwrap();
        let mid = &out[2_000..20_000];
        let peak = mid.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak={peak}");
    }
}
