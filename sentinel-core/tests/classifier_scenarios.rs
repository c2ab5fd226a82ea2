use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sentinel_core::dsp::NormalizationStats;
use sentinel_core::{
    ClassificationResult, ClassifierState, DangerClassifier, DetectorConfig, Label, LinearModel,
    ModelHandle, SentinelError,
};

fn noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

/// Random dense head: never ties, so every labelled result is decisive.
fn random_head(len: usize, seed: u64) -> LinearModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let danger = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let safe = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    LinearModel::new(danger, safe, [0.1, -0.1]).unwrap()
}

fn ready_classifier() -> DangerClassifier {
    let config = DetectorConfig::default();
    let len = config.feature_len();
    let classifier = DangerClassifier::new(config);
    classifier
        .initialize_with(
            ModelHandle::new(random_head(len, 42)),
            NormalizationStats::identity(len / 2),
        )
        .expect("initialize with linear head");
    classifier
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sentinel-it-{name}-{}", std::process::id()))
}

fn assert_decisive(result: &ClassificationResult) {
    match result {
        ClassificationResult::Danger {
            confidence,
            probabilities,
        }
        | ClassificationResult::Safe {
            confidence,
            probabilities,
        } => {
            assert!(*confidence > 0.5 && *confidence <= 1.0, "confidence {confidence}");
            assert!((probabilities.danger + probabilities.safe - 1.0).abs() < 1e-5);
        }
        other => panic!("expected a label, got {other:?}"),
    }
}

#[test]
fn full_window_of_zeros_is_silent() {
    let classifier = ready_classifier();
    let samples = vec![0.0; classifier.config().num_samples()];
    assert_eq!(classifier.classify(&samples), ClassificationResult::Silent);
}

#[test]
fn full_window_of_noise_gets_a_confident_label() {
    let classifier = ready_classifier();
    let samples = noise(classifier.config().num_samples(), 1.0, 7);
    let result = classifier.classify(&samples);
    assert_decisive(&result);
    assert!(matches!(result.label(), Some(Label::Danger | Label::Safe)));
}

#[test]
fn half_window_is_padded_and_classified() {
    let classifier = ready_classifier();
    let samples = noise(classifier.config().num_samples() / 2, 0.5, 11);
    assert_decisive(&classifier.classify(&samples));
}

#[test]
fn oversized_input_is_trimmed() {
    let classifier = ready_classifier();
    let samples = noise(classifier.config().num_samples() * 2, 0.5, 13);
    assert_decisive(&classifier.classify(&samples));
}

#[test]
fn classification_is_deterministic() {
    let classifier = ready_classifier();
    let samples = noise(classifier.config().num_samples(), 0.3, 99);
    let first = classifier.classify(&samples);
    let second = classifier.classify(&samples);
    assert_eq!(first, second);
}

#[test]
fn not_initialized_before_init_and_after_close() {
    let classifier = DangerClassifier::new(DetectorConfig::default());
    let samples = noise(classifier.config().num_samples(), 0.5, 1);
    assert_eq!(classifier.classify(&samples), ClassificationResult::NotInitialized);

    let classifier = ready_classifier();
    classifier.close();
    assert_eq!(classifier.state(), ClassifierState::Closed);
    assert_eq!(classifier.classify(&samples), ClassificationResult::NotInitialized);

    // Closed is terminal.
    let len = classifier.config().feature_len();
    let err = classifier
        .initialize_with(
            ModelHandle::new(LinearModel::zeros(len)),
            NormalizationStats::identity(len / 2),
        )
        .unwrap_err();
    assert!(matches!(err, SentinelError::Configuration(_)));
}

#[test]
fn classify_wav_decodes_and_resamples() {
    let path = temp_path("noise.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..44_100 * 2 {
        let v: i16 = rng.gen_range(-12_000..12_000);
        writer.write_sample(v).unwrap();
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();

    let classifier = ready_classifier();
    let result = classifier.classify_wav(&path).expect("decode wav");
    assert_decisive(&result);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn classify_wav_reports_missing_file() {
    let classifier = ready_classifier();
    assert!(classifier
        .classify_wav(&temp_path("does-not-exist.wav"))
        .is_err());
}

#[test]
fn load_from_linear_package() {
    let dir = temp_path("package");
    std::fs::create_dir_all(&dir).unwrap();
    let config = DetectorConfig::default();
    let len = config.feature_len();
    let n = config.num_coefficients;

    let mut danger = vec![0.0f32; len];
    danger[0] = 1.0;
    let weights = serde_json::json!({
        "weights": [danger, vec![0.0f32; len]],
        "bias": [0.0, 0.0],
    });
    std::fs::write(dir.join("head.json"), weights.to_string()).unwrap();

    let manifest = serde_json::json!({
        "format": "linear",
        "model": "head.json",
        "normalization": { "mean": vec![0.0f32; n], "std": vec![1.0f32; n] },
    });
    let manifest_path = dir.join("package.json");
    std::fs::write(&manifest_path, manifest.to_string()).unwrap();

    let classifier = DangerClassifier::new(config);
    classifier.load(&manifest_path).expect("load package");
    assert_eq!(classifier.state(), ClassifierState::Ready);

    let samples = noise(classifier.config().num_samples(), 0.5, 21);
    assert!(classifier.classify(&samples).label().is_some());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_package_fails_initialization() {
    let classifier = DangerClassifier::new(DetectorConfig::default());
    let err = classifier
        .load(&temp_path("missing-package.json"))
        .unwrap_err();
    assert!(matches!(err, SentinelError::ModelNotFound { .. }));
    assert_eq!(classifier.state(), ClassifierState::Failed);
    assert!(classifier.classify(&[0.5; 1_000]).is_error());
}
