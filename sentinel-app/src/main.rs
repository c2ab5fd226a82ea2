//! Sentinel host entry point.
//!
//! ```text
//! sentinel [--package PATH] [--settings PATH] listen [--device NAME] [--replay FILE.wav]
//! sentinel [--package PATH] [--settings PATH] classify FILE.wav...
//! sentinel devices
//! ```
//!
//! Every result is printed to stdout as one JSON line; logs go to stderr.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sentinel_core::audio::{list_input_devices, PcmSource, WavSource};
use sentinel_core::inference::package::default_package_path;
use sentinel_core::{DangerClassifier, DetectionEngine, EngineStatus};
use settings::{apply_env_overrides, default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sentinel", version)]
#[command(about = "Listen for dangerous sounds or classify WAV files")]
struct Cli {
    /// Model package manifest
    #[arg(long, global = true)]
    package: Option<PathBuf>,

    /// Settings file (created with defaults when missing)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Classify live audio until interrupted
    Listen {
        /// Input device name; defaults to the configured or system device
        #[arg(long)]
        device: Option<String>,

        /// Replay a WAV file in real time instead of capturing
        #[arg(long, conflicts_with = "device")]
        replay: Option<PathBuf>,
    },
    /// Classify one window from each WAV file
    Classify {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List capture devices
    Devices,
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("failed to serialize output: {e}"),
    }
}

fn resolve_package(cli: &Cli, settings: &AppSettings) -> PathBuf {
    cli.package
        .clone()
        .or_else(|| settings.package_path.clone())
        .unwrap_or_else(default_package_path)
}

fn load_classifier(package: &Path, settings: &AppSettings) -> anyhow::Result<DangerClassifier> {
    let classifier = DangerClassifier::new(settings.detector.clone());
    classifier
        .load(package)
        .with_context(|| format!("failed to load model package {}", package.display()))?;
    Ok(classifier)
}

fn classify_files(classifier: &DangerClassifier, files: &[PathBuf]) {
    for file in files {
        let line = match classifier.classify_wav(file) {
            Ok(result) => serde_json::json!({ "file": file, "result": result }),
            Err(e) => {
                warn!(file = %file.display(), "classification skipped: {e}");
                serde_json::json!({ "file": file, "error": e.to_string() })
            }
        };
        print_json(&line);
    }
}

async fn listen(
    engine: Arc<DetectionEngine>,
    device: Option<String>,
    replay: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut results_rx = engine.subscribe_results();
    let mut status_rx = engine.subscribe_status();

    let printer = tokio::spawn(async move {
        loop {
            match results_rx.recv().await {
                Ok(event) => print_json(&event),
                Err(RecvError::Lagged(n)) => warn!("result receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let starter = Arc::clone(&engine);
    let sample_rate = engine.classifier().config().sample_rate;
    tokio::task::spawn_blocking(move || match replay {
        Some(path) => starter.start_with_source(Box::new(move || {
            let source = WavSource::open(&path, sample_rate)?.paced();
            Ok(Box::new(source) as Box<dyn PcmSource>)
        })),
        None => starter.start_with_device(device),
    })
    .await
    .context("start task panicked")??;
    info!("listening; press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            status = status_rx.recv() => match status {
                Ok(event) => {
                    print_json(&event);
                    if matches!(event.status, EngineStatus::Stopped | EngineStatus::Error) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("status receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let stopper = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || stopper.shutdown())
        .await
        .context("shutdown task panicked")?;
    print_json(&engine.diagnostics_snapshot());
    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &settings) {
            warn!("could not write default settings to {}: {e}", settings_path.display());
        }
    }
    apply_env_overrides(&mut settings);
    info!(settings = %settings_path.display(), "settings loaded");

    match &cli.command {
        Command::Devices => {
            for device in list_input_devices() {
                print_json(&device);
            }
        }
        Command::Classify { files } => {
            let package = resolve_package(&cli, &settings);
            let classifier = load_classifier(&package, &settings)?;
            classify_files(&classifier, files);
            classifier.close();
        }
        Command::Listen { device, replay } => {
            let package = resolve_package(&cli, &settings);
            let classifier = load_classifier(&package, &settings)?;
            let device = device
                .clone()
                .or_else(|| settings.preferred_input_device.clone());
            let engine = Arc::new(DetectionEngine::new(settings.engine_config(), classifier));
            listen(engine, device, replay.clone()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sentinel").chain(args.iter().copied()))
    }

    #[test]
    fn parses_listen_with_flags() {
        let cli = parse(&["--package", "/models/package.json", "listen", "--device", "USB Mic"])
            .unwrap();
        assert_eq!(cli.package, Some(PathBuf::from("/models/package.json")));
        assert_eq!(
            cli.command,
            Command::Listen {
                device: Some("USB Mic".into()),
                replay: None
            }
        );
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&["listen", "--replay", "clip.wav", "--settings", "s.json"]).unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("s.json")));
        assert_eq!(
            cli.command,
            Command::Listen {
                device: None,
                replay: Some(PathBuf::from("clip.wav"))
            }
        );
    }

    #[test]
    fn parses_classify_files() {
        let cli = parse(&["classify", "a.wav", "b.wav"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Classify {
                files: vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]
            }
        );
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["classify"]).is_err());
        assert!(parse(&["listen", "--device"]).is_err());
        assert!(parse(&["listen", "--device", "mic", "--replay", "a.wav"]).is_err());
        assert!(parse(&["devices", "extra"]).is_err());
        assert!(parse(&["--verbose", "devices"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
