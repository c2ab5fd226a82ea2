//! Signal processing: FFT, mel filterbank, MFCC extraction and feature
//! aggregation.

pub mod features;
pub mod fft;
pub mod mel;
pub mod mfcc;

pub use features::{aggregate, feature_vector, normalize, FeatureVector, NormalizationStats};
pub use fft::{hamming_window, FftEngine};
pub use mel::{hz_to_mel, mel_to_hz, MelFilterBank};
pub use mfcc::{fit_length, frame_count, pre_emphasis, MfccExtractor, MfccMatrix};
