//! WAV decoding and replay.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use super::resample::resample_buffer;
use super::{f32_to_i16, PcmSource};
use crate::error::Result;

/// Decode any PCM/float WAV to mono f32, averaging channels.
///
/// Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            // Full scale is 2^(bits - 1) for every integer depth.
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Decode `path` and resample it to `target_rate`.
pub fn load_wav_resampled(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let (samples, rate) = read_wav_mono(path)?;
    debug!(
        path = %path.display(),
        samples = samples.len(),
        rate,
        target_rate,
        "decoded WAV"
    );
    resample_buffer(&samples, rate, target_rate)
}

/// Replays a decoded WAV file through the `PcmSource` contract.
pub struct WavSource {
    samples: Vec<i16>,
    position: usize,
    sample_rate: u32,
    /// When set, reads are throttled to real time.
    paced: Option<Instant>,
}

impl WavSource {
    pub fn open(path: &Path, target_rate: u32) -> Result<Self> {
        let samples = load_wav_resampled(path, target_rate)?;
        Ok(Self::from_samples(&samples, target_rate))
    }

    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            samples: samples.iter().copied().map(f32_to_i16).collect(),
            position: 0,
            sample_rate,
            paced: None,
        }
    }

    /// Deliver samples no faster than a live microphone would.
    pub fn paced(mut self) -> Self {
        self.paced = Some(Instant::now());
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl PcmSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        let mut n = buf.len().min(self.samples.len() - self.position);
        if let Some(started) = self.paced {
            let elapsed = started.elapsed().as_secs_f64();
            let due = (elapsed * self.sample_rate as f64) as usize;
            let allowed = due.saturating_sub(self.position);
            if allowed == 0 && n > 0 {
                std::thread::sleep(Duration::from_millis(10));
                return Ok(0);
            }
            n = n.min(allowed);
        }
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(name: &str, spec: hound::WavSpec, frames: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sentinel-wav-{name}-{}.wav", std::process::id()));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..spec.channels {
                let v = if ch == 0 { 8_192i16 } else { -8_192 };
                writer.write_sample(if i % 2 == 0 { v } else { 0 }).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = write_wav("stereo", spec, 100);
        let (mono, rate) = read_wav_mono(&path).unwrap();
        assert_eq!(rate, 22_050);
        assert_eq!(mono.len(), 100);
        assert!(mono.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn int16_scales_by_32768() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = write_wav("mono", spec, 4);
        let (mono, _) = read_wav_mono(&path).unwrap();
        assert_eq!(mono, vec![0.25, 0.0, 0.25, 0.0]);
    }

    #[test]
    fn int8_scales_by_128() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let path = std::env::temp_dir().join(format!("sentinel-wav-8bit-{}.wav", std::process::id()));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [64i8, -64, 127, -128] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, _) = read_wav_mono(&path).unwrap();
        assert_eq!(mono, vec![0.5, -0.5, 127.0 / 128.0, -1.0]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn resamples_to_target_rate() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = write_wav("resample", spec, 44_100);
        let out = load_wav_resampled(&path, 22_050).unwrap();
        assert_eq!(out.len(), 22_050);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_wav_mono(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, crate::error::SentinelError::Io(_)));
    }

    #[test]
    fn source_streams_until_exhausted() {
        let mut source = WavSource::from_samples(&[0.5; 10], 22_050);
        let mut buf = [0i16; 4];
        let mut total = 0;
        while !source.is_exhausted() {
            total += source.read(&mut buf).unwrap();
        }
        assert_eq!(total, 10);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(buf[0], 16_384);
    }
}
