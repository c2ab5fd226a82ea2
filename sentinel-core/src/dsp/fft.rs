//! Fixed-size radix-2 FFT with Hamming windowing.
//!
//! The transform is an iterative Cooley-Tukey: inputs are placed in
//! bit-reversed order, then `log2(N)` butterfly passes run in place.
//! Twiddle factors and the permutation table are computed once per size
//! (in f64, rounded to f32) so a single `FftEngine` can be shared
//! read-only between classification calls.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::{Result, SentinelError};

/// `w[i] = 0.54 - 0.46 * cos(2πi / (N-1))`.
pub fn hamming_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| (0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos()) as f32)
        .collect()
}

#[derive(Debug, Clone)]
pub struct FftEngine {
    size: usize,
    window: Vec<f32>,
    /// `bit_reversed[i]` is the destination of input `i`.
    bit_reversed: Vec<usize>,
    /// `exp(-2πik/N)` for `k < N/2`.
    twiddles: Vec<Complex<f32>>,
}

impl FftEngine {
    /// Build an engine for frames of `size` samples.
    ///
    /// # Errors
    /// `SentinelError::Configuration` when `size` is zero or not a power of two.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(SentinelError::Configuration(format!(
                "FFT size {size} is not a power of two"
            )));
        }

        let bits = size.trailing_zeros();
        let bit_reversed = (0..size)
            .map(|i| {
                if bits == 0 {
                    0
                } else {
                    i.reverse_bits() >> (usize::BITS - bits)
                }
            })
            .collect();

        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / size as f64;
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();

        Ok(Self {
            size,
            window: hamming_window(size),
            bit_reversed,
            twiddles,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// In-place forward transform of exactly `size` complex values.
    pub fn forward(&self, buf: &mut [Complex<f32>]) {
        assert_eq!(buf.len(), self.size, "FFT buffer length mismatch");

        for (i, &j) in self.bit_reversed.iter().enumerate() {
            if i < j {
                buf.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= self.size {
            let half = len / 2;
            let stride = self.size / len;
            for start in (0..self.size).step_by(len) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let a = buf[start + k];
                    let b = buf[start + k + half] * w;
                    buf[start + k] = a + b;
                    buf[start + k + half] = a - b;
                }
            }
            len <<= 1;
        }
    }

    /// In-place inverse transform, scaled by `1/N`.
    pub fn inverse(&self, buf: &mut [Complex<f32>]) {
        for v in buf.iter_mut() {
            *v = v.conj();
        }
        self.forward(buf);
        let scale = 1.0 / self.size as f32;
        for v in buf.iter_mut() {
            *v = v.conj() * scale;
        }
    }

    /// Window `frame` into `scratch` and transform it.
    ///
    /// Frames shorter than the FFT size are zero-padded; longer frames are
    /// cut at `size` samples.
    pub fn transform_frame(&self, frame: &[f32], scratch: &mut Vec<Complex<f32>>) {
        scratch.clear();
        scratch.resize(self.size, Complex::new(0.0, 0.0));
        for (dst, (&s, &w)) in scratch.iter_mut().zip(frame.iter().zip(&self.window)) {
            *dst = Complex::new(s * w, 0.0);
        }
        self.forward(scratch);
    }

    /// Windowed FFT as interleaved `[re0, im0, re1, im1, ...]` of length `2N`.
    pub fn forward_interleaved(&self, frame: &[f32]) -> Vec<f32> {
        let mut scratch = Vec::with_capacity(self.size);
        self.transform_frame(frame, &mut scratch);
        scratch.iter().flat_map(|c| [c.re, c.im]).collect()
    }

    /// Power spectrum `re² + im²` of the windowed frame into `out`
    /// (`N/2 + 1` bins).
    pub fn power_spectrum(
        &self,
        frame: &[f32],
        scratch: &mut Vec<Complex<f32>>,
        out: &mut [f32],
    ) {
        debug_assert_eq!(out.len(), self.size / 2 + 1);
        self.transform_frame(frame, scratch);
        for (dst, c) in out.iter_mut().zip(scratch.iter()) {
            *dst = c.norm_sqr();
        }
    }
}
