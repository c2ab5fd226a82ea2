//! Triangular mel filterbank.
//!
//! A bank depends only on `(num_filters, fft_size, sample_rate, low, high)`,
//! never on audio, so `MelFilterBank::shared` keeps one instance per shape
//! for the whole process and hands out `Arc`s.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::error::{Result, SentinelError};

pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BankKey {
    num_filters: usize,
    fft_size: usize,
    sample_rate: u32,
    low_bits: u32,
    high_bits: u32,
}

static SHARED_BANKS: OnceLock<Mutex<HashMap<BankKey, Arc<MelFilterBank>>>> = OnceLock::new();

/// Row-major `[num_filters][fft_size/2 + 1]` weight matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFilterBank {
    num_filters: usize,
    num_bins: usize,
    weights: Vec<f32>,
}

impl MelFilterBank {
    /// Build a bank of `num_filters` triangles between `low_hz` and `high_hz`.
    ///
    /// Neighbouring mel points that land on the same FFT bin produce a
    /// zero-width edge; that edge contributes no weight rather than dividing
    /// by zero.
    pub fn new(
        num_filters: usize,
        fft_size: usize,
        sample_rate: u32,
        low_hz: f32,
        high_hz: f32,
    ) -> Result<Self> {
        if num_filters == 0 || fft_size < 2 || sample_rate == 0 {
            return Err(SentinelError::Configuration(format!(
                "invalid filterbank shape: filters={num_filters} fft={fft_size} sr={sample_rate}"
            )));
        }
        if !(low_hz >= 0.0 && low_hz < high_hz) {
            return Err(SentinelError::Configuration(format!(
                "invalid mel range {low_hz}..{high_hz} Hz"
            )));
        }

        let num_bins = fft_size / 2 + 1;
        let low_mel = hz_to_mel(low_hz);
        let high_mel = hz_to_mel(high_hz);
        let step = (high_mel - low_mel) / (num_filters + 1) as f32;

        let bins: Vec<usize> = (0..num_filters + 2)
            .map(|i| {
                let hz = mel_to_hz(low_mel + i as f32 * step);
                let bin = ((fft_size + 1) as f32 * hz / sample_rate as f32).floor();
                (bin.max(0.0) as usize).min(num_bins - 1)
            })
            .collect();

        let mut weights = vec![0f32; num_filters * num_bins];
        let mut degenerate = 0usize;
        for (m, row) in weights.chunks_exact_mut(num_bins).enumerate() {
            let (left, center, right) = (bins[m], bins[m + 1], bins[m + 2]);

            if center > left {
                let width = (center - left) as f32;
                for (j, w) in row.iter_mut().enumerate().take(center).skip(left) {
                    *w = (j - left) as f32 / width;
                }
            }
            if right > center {
                let width = (right - center) as f32;
                for (j, w) in row.iter_mut().enumerate().take(right).skip(center) {
                    *w = (right - j) as f32 / width;
                }
            }
            if row.iter().all(|&w| w == 0.0) {
                degenerate += 1;
            }
        }

        if degenerate > 0 {
            debug!(
                degenerate,
                num_filters, fft_size, "mel filterbank has all-zero filters"
            );
        }

        Ok(Self {
            num_filters,
            num_bins,
            weights,
        })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Self::new(
            config.num_filters,
            config.frame_size,
            config.sample_rate,
            config.low_freq_hz,
            config.high_freq_hz,
        )
    }

    /// Process-wide cached bank for `config`.
    pub fn shared(config: &DetectorConfig) -> Result<Arc<Self>> {
        let key = BankKey {
            num_filters: config.num_filters,
            fft_size: config.frame_size,
            sample_rate: config.sample_rate,
            low_bits: config.low_freq_hz.to_bits(),
            high_bits: config.high_freq_hz.to_bits(),
        };
        let cache = SHARED_BANKS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut cache = cache.lock();
        if let Some(bank) = cache.get(&key) {
            return Ok(Arc::clone(bank));
        }
        let bank = Arc::new(Self::from_config(config)?);
        cache.insert(key, Arc::clone(&bank));
        Ok(bank)
    }

    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn row(&self, filter: usize) -> &[f32] {
        &self.weights[filter * self.num_bins..(filter + 1) * self.num_bins]
    }

    /// `out[m] = Σ_k power[k] · weight[m][k]`.
    pub fn apply(&self, power: &[f32], out: &mut [f32]) {
        debug_assert_eq!(power.len(), self.num_bins);
        debug_assert_eq!(out.len(), self.num_filters);
        for (dst, row) in out.iter_mut().zip(self.weights.chunks_exact(self.num_bins)) {
            *dst = row.iter().zip(power).map(|(w, p)| w * p).sum();
        }
    }
}
