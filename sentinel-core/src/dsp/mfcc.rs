//! MFCC front end: pre-emphasis, length fitting, framing, log-mel, DCT-II.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;

use super::fft::FftEngine;
use super::mel::MelFilterBank;
use crate::config::DetectorConfig;
use crate::error::{Result, SentinelError};

/// Floor applied to mel energies before the logarithm.
const LOG_FLOOR: f32 = 1e-10;

/// First-order high-pass: `y[0] = x[0]`, `y[i] = x[i] - coeff * x[i-1]`.
pub fn pre_emphasis(samples: &[f32], coeff: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    if let Some(&first) = samples.first() {
        out.push(first);
        out.extend(samples.windows(2).map(|w| w[1] - coeff * w[0]));
    }
    out
}

/// Force `samples` to exactly `target` samples.
///
/// Longer input keeps the centred segment, shorter input is zero-padded on
/// the right, equal input is returned as is.
pub fn fit_length(mut samples: Vec<f32>, target: usize) -> Vec<f32> {
    match samples.len().cmp(&target) {
        std::cmp::Ordering::Greater => {
            let start = (samples.len() - target) / 2;
            samples.drain(..start);
            samples.truncate(target);
            samples
        }
        std::cmp::Ordering::Less => {
            samples.resize(target, 0.0);
            samples
        }
        std::cmp::Ordering::Equal => samples,
    }
}

/// `1 + (len - frame) / hop`, or `None` when the signal is shorter than one frame.
pub fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> Option<usize> {
    if len < frame_size || hop_size == 0 {
        return None;
    }
    Some(1 + (len - frame_size) / hop_size)
}

/// `[num_coefficients][num_frames]` cepstral matrix, stored coefficient-major.
#[derive(Debug, Clone, PartialEq)]
pub struct MfccMatrix {
    num_coefficients: usize,
    num_frames: usize,
    data: Vec<f32>,
}

impl MfccMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let num_coefficients = rows.len();
        let num_frames = rows.first().map_or(0, Vec::len);
        let data = rows.into_iter().flatten().collect::<Vec<_>>();
        debug_assert_eq!(data.len(), num_coefficients * num_frames);
        Self {
            num_coefficients,
            num_frames,
            data,
        }
    }

    pub fn num_coefficients(&self) -> usize {
        self.num_coefficients
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// All frames of one coefficient.
    pub fn coefficient(&self, c: usize) -> &[f32] {
        &self.data[c * self.num_frames..(c + 1) * self.num_frames]
    }

    pub fn get(&self, coefficient: usize, frame: usize) -> f32 {
        self.data[coefficient * self.num_frames + frame]
    }
}

/// Computes MFCC matrices for signals of at least one frame.
#[derive(Debug, Clone)]
pub struct MfccExtractor {
    frame_size: usize,
    hop_size: usize,
    num_coefficients: usize,
    fft: FftEngine,
    filter_bank: Arc<MelFilterBank>,
    /// Row-major `[num_coefficients][num_filters]` DCT-II basis with the
    /// `sqrt(2/M)` scale folded in.
    dct: Vec<f32>,
}

impl MfccExtractor {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let fft = FftEngine::new(config.frame_size)?;
        let filter_bank = MelFilterBank::shared(config)?;
        if config.num_coefficients == 0 || config.num_coefficients > filter_bank.num_filters() {
            return Err(SentinelError::Configuration(format!(
                "cannot take {} cepstral coefficients from {} mel filters",
                config.num_coefficients,
                filter_bank.num_filters()
            )));
        }
        if config.hop_size == 0 {
            return Err(SentinelError::Configuration("hop size must be positive".into()));
        }

        let m = filter_bank.num_filters();
        let scale = (2.0 / m as f64).sqrt();
        let dct = (0..config.num_coefficients)
            .flat_map(|j| {
                (0..m).map(move |k| {
                    (scale * (PI * j as f64 * (k as f64 + 0.5) / m as f64).cos()) as f32
                })
            })
            .collect();

        Ok(Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            num_coefficients: config.num_coefficients,
            fft,
            filter_bank,
            dct,
        })
    }

    pub fn filter_bank(&self) -> &Arc<MelFilterBank> {
        &self.filter_bank
    }

    /// Cepstral coefficients for every frame of `signal`.
    ///
    /// `signal` is expected to be pre-emphasized already.
    ///
    /// # Errors
    /// `SentinelError::InputTooShort` when `signal` cannot hold a single frame.
    pub fn extract(&self, signal: &[f32]) -> Result<MfccMatrix> {
        let num_frames = frame_count(signal.len(), self.frame_size, self.hop_size).ok_or(
            SentinelError::InputTooShort {
                len: signal.len(),
                frame_size: self.frame_size,
            },
        )?;

        let num_filters = self.filter_bank.num_filters();
        let mut scratch: Vec<Complex<f32>> = Vec::with_capacity(self.frame_size);
        let mut power = vec![0f32; self.filter_bank.num_bins()];
        let mut log_mel = vec![0f32; num_filters];
        let mut data = vec![0f32; self.num_coefficients * num_frames];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.hop_size;
            let frame = &signal[start..start + self.frame_size];

            self.fft.power_spectrum(frame, &mut scratch, &mut power);
            self.filter_bank.apply(&power, &mut log_mel);
            for e in log_mel.iter_mut() {
                *e = e.max(LOG_FLOOR).ln();
            }

            for (j, basis) in self.dct.chunks_exact(num_filters).enumerate() {
                let c: f32 = basis.iter().zip(&log_mel).map(|(b, e)| b * e).sum();
                data[j * num_frames + frame_idx] = c;
            }
        }

        Ok(MfccMatrix {
            num_coefficients: self.num_coefficients,
            num_frames,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn small_config() -> DetectorConfig {
        DetectorConfig {
            sample_rate: 8_000,
            duration_secs: 0.5,
            frame_size: 256,
            hop_size: 128,
            num_filters: 20,
            num_coefficients: 13,
            low_freq_hz: 20.0,
            high_freq_hz: 4_000.0,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn pre_emphasis_keeps_first_sample() {
        let y = pre_emphasis(&[1.0, 1.0, 0.5, 0.0], 0.97);
        assert_eq!(y.len(), 4);
        assert_abs_diff_eq!(y[0], 1.0);
        assert_abs_diff_eq!(y[1], 0.03, epsilon = 1e-6);
        assert_abs_diff_eq!(y[2], 0.5 - 0.97, epsilon = 1e-6);
        assert_abs_diff_eq!(y[3], -0.485, epsilon = 1e-6);
        assert!(pre_emphasis(&[], 0.97).is_empty());
    }

    #[test]
    fn fit_length_takes_centred_segment() {
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let out = fit_length(input, 6);
        assert_eq!(out, vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn fit_length_pads_right_with_zeros() {
        let out = fit_length(vec![1.0, 2.0], 5);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn fit_length_passes_exact_input_through() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(fit_length(input.clone(), 3), input);
    }

    #[test]
    fn frame_count_matches_formula() {
        assert_eq!(frame_count(88_200, 2_048, 512), Some(1 + (88_200 - 2_048) / 512));
        assert_eq!(frame_count(2_048, 2_048, 512), Some(1));
        assert_eq!(frame_count(2_047, 2_048, 512), None);
    }

    #[test]
    fn extract_produces_expected_shape() {
        let config = small_config();
        let extractor = MfccExtractor::new(&config).unwrap();
        let signal: Vec<f32> = (0..config.num_samples())
            .map(|i| (i as f32 * 0.1).sin() * 0.5)
            .collect();
        let mfcc = extractor.extract(&signal).unwrap();
        assert_eq!(mfcc.num_coefficients(), 13);
        assert_eq!(
            mfcc.num_frames(),
            frame_count(signal.len(), 256, 128).unwrap()
        );
        assert!(mfcc.coefficient(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn silence_hits_the_log_floor() {
        let config = small_config();
        let extractor = MfccExtractor::new(&config).unwrap();
        let mfcc = extractor.extract(&vec![0.0; 256]).unwrap();
        assert_eq!(mfcc.num_frames(), 1);

        // Every log energy equals ln(1e-10); only c0 is non-zero.
        let m = extractor.filter_bank().num_filters() as f32;
        let expected_c0 = (2.0 / m).sqrt() * m * LOG_FLOOR.ln();
        assert_abs_diff_eq!(mfcc.get(0, 0), expected_c0, epsilon = 1e-2);
        for c in 1..13 {
            assert_abs_diff_eq!(mfcc.get(c, 0), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn short_signal_is_an_error() {
        let extractor = MfccExtractor::new(&small_config()).unwrap();
        assert!(matches!(
            extractor.extract(&[0.0; 100]),
            Err(SentinelError::InputTooShort {
                len: 100,
                frame_size: 256
            })
        ));
    }
}
