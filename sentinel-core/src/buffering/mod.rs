//! Sample buffering between the audio callback, the capture thread and the
//! classification worker.
//!
//! - `HeapRb<f32>` SPSC ring: wait-free `push_slice` from the real-time
//!   callback, drained by `CpalSource::read` on the capture thread.
//! - `window::WindowAccumulator`: collects i16 PCM into fixed-length
//!   classification windows.

pub mod window;

pub use window::WindowAccumulator;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the audio callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^20 = 1 048 576 f32 samples, about 21.8 s at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 20;

pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_passes_samples_in_order() {
        let (mut prod, mut cons) = create_audio_ring();
        assert_eq!(prod.push_slice(&[0.1, 0.2, 0.3]), 3);
        let mut out = [0f32; 4];
        assert_eq!(cons.pop_slice(&mut out), 3);
        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
    }
}
