//! PCM sources: live microphone capture via cpal, WAV replay via hound.
//!
//! # Real-time constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate after the first callback, block, or perform I/O.
//! It only downmixes to mono and pushes into an SPSC ring buffer whose
//! `push_slice` is lock-free; resampling and i16 conversion happen on the
//! capture thread inside `CpalSource::read`.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS), so `PcmSource` is not `Send` either. Sources are opened, read and
//! dropped on the capture thread; see `capture::CaptureWorker`.

pub mod device;
pub mod resample;
pub mod wav;

pub use device::{list_input_devices, DeviceInfo};
pub use resample::{resample_buffer, RateConverter};
pub use wav::{read_wav_mono, WavSource};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

#[cfg(feature = "audio-cpal")]
use crate::buffering::{create_audio_ring, AudioConsumer, AudioProducer, Consumer, Producer};
use crate::error::{Result, SentinelError};

/// Blocking source of mono 16-bit PCM at a fixed sample rate.
pub trait PcmSource {
    /// Sample rate of the data returned by `read`.
    fn sample_rate(&self) -> u32;

    /// Fill `buf` with up to `buf.len()` samples, returning how many were
    /// written. `Ok(0)` means nothing was available yet.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;

    /// `true` once a finite source has delivered its last sample.
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<S: PcmSource + ?Sized> PcmSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        (**self).read(buf)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}

/// f32 in [-1, 1] to i16, saturating.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16
}

/// Live microphone input, resampled to the detector rate.
pub struct CpalSource {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    #[cfg(feature = "audio-cpal")]
    consumer: AudioConsumer,
    running: Arc<AtomicBool>,
    /// Samples the callback could not push because the ring was full.
    overflow: Arc<AtomicUsize>,
    converter: RateConverter,
    target_rate: u32,
    device_name: String,
    /// Popped from the ring, before resampling.
    raw: Vec<f32>,
    /// Resampled and converted, not yet handed to the reader.
    pending: Vec<i16>,
}

/// How long `read` waits for the callback before reporting no data.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(feature = "audio-cpal")]
impl CpalSource {
    /// Open `preferred_device` (or the system default) and start streaming.
    ///
    /// Must be called on the thread that will also drop the returned value.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when no microphone exists, `AudioDevice` /
    /// `AudioStream` if cpal fails to configure or build the stream.
    pub fn open(preferred_device: Option<&str>, target_rate: u32) -> Result<Self> {
        let device = device::find_input_device(preferred_device)?;
        let device_name = device.name().unwrap_or_default();

        let supported = device
            .default_input_config()
            .map_err(|e| SentinelError::AudioDevice(e.to_string()))?;
        let capture_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device_name.as_str(),
            capture_rate, channels, target_rate, "opening input device"
        );

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(capture_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_audio_ring();
        let running = Arc::new(AtomicBool::new(true));
        let overflow = Arc::new(AtomicUsize::new(0));
        let shared = (Arc::clone(&running), Arc::clone(&overflow));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, producer, shared, |s| s),
            SampleFormat::I16 => {
                build_mono_stream::<i16>(&device, &config, producer, shared, |s| s as f32 / 32_768.0)
            }
            SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, shared, |s| {
                (s as f32 - 128.0) / 128.0
            }),
            fmt => {
                return Err(SentinelError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| SentinelError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            running,
            overflow,
            converter: RateConverter::new(capture_rate, target_rate, resample::RESAMPLE_CHUNK)?,
            target_rate,
            device_name,
            raw: vec![0f32; resample::RESAMPLE_CHUNK * 4],
            pending: Vec::new(),
        })
    }

    fn fill_pending(&mut self) {
        let popped = self.consumer.pop_slice(&mut self.raw);
        if popped == 0 {
            return;
        }
        let resampled = self.converter.process(&self.raw[..popped]);
        self.pending.extend(resampled.into_iter().map(f32_to_i16));
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl CpalSource {
    pub fn open(_preferred_device: Option<&str>, _target_rate: u32) -> Result<Self> {
        Err(SentinelError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn fill_pending(&mut self) {}
}

impl CpalSource {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Samples lost in the real-time callback since the stream opened.
    pub fn overflow_count(&self) -> usize {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl PcmSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        if self.pending.len() < buf.len() {
            self.fill_pending();
        }
        if self.pending.is_empty() {
            std::thread::sleep(POLL_INTERVAL);
            self.fill_pending();
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        let lost = self.overflow.load(Ordering::Relaxed);
        if lost > 0 {
            tracing::warn!(lost, "input ring overflowed while capturing");
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    (running, overflow): (Arc<AtomicBool>, Arc<AtomicUsize>),
    to_f32: fn(T) -> f32,
) -> Result<Stream>
where
    T: cpal::SizedSample + 'static,
{
    let ch = usize::from(config.channels.max(1));
    let mut mix: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                mix.resize(data.len() / ch, 0.0);
                for (dst, frame) in mix.iter_mut().zip(data.chunks_exact(ch)) {
                    *dst = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / ch as f32;
                }
                let written = producer.push_slice(&mix);
                if written < mix.len() {
                    overflow.fetch_add(mix.len() - written, Ordering::Relaxed);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| SentinelError::AudioStream(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_i16_saturates() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(0.5), 16_384);
        assert_eq!(f32_to_i16(-1.0), -32_768);
        assert_eq!(f32_to_i16(1.0), 32_767);
        assert_eq!(f32_to_i16(2.5), 32_767);
    }
}
