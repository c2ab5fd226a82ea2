//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use sentinel_core::{AlertPolicy, DetectorConfig, EngineConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Model package manifest; `None` uses the core default location.
    pub package_path: Option<PathBuf>,
    pub preferred_input_device: Option<String>,
    /// Minimum danger confidence that raises an alert.
    pub sensitivity: f32,
    pub channel_capacity: usize,
    pub detector: DetectorConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            package_path: None,
            preferred_input_device: None,
            sensitivity: AlertPolicy::DEFAULT_SENSITIVITY,
            channel_capacity: EngineConfig::default().channel_capacity,
            detector: DetectorConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.sensitivity = AlertPolicy::new(self.sensitivity).sensitivity;
        self.channel_capacity = self.channel_capacity.clamp(1, 64);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.package_path = self
            .package_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
        if !(self.detector.silence_threshold.is_finite() && self.detector.silence_threshold >= 0.0)
        {
            self.detector.silence_threshold = DetectorConfig::default().silence_threshold;
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            channel_capacity: self.channel_capacity,
            alert_policy: AlertPolicy::new(self.sensitivity),
        }
    }
}

/// `SENTINEL_SENSITIVITY` overrides the persisted sensitivity.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    if std::env::var("SENTINEL_SENSITIVITY").is_ok() {
        settings.sensitivity = AlertPolicy::from_env().sensitivity;
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Sentinel")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("sentinel")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_and_trims() {
        let mut settings = AppSettings {
            package_path: Some(PathBuf::new()),
            preferred_input_device: Some("   ".into()),
            sensitivity: 4.0,
            channel_capacity: 0,
            detector: DetectorConfig {
                silence_threshold: f32::NAN,
                ..DetectorConfig::default()
            },
        };
        settings.normalize();
        assert_eq!(settings.package_path, None);
        assert_eq!(settings.preferred_input_device, None);
        assert_eq!(settings.sensitivity, 1.0);
        assert_eq!(settings.channel_capacity, 1);
        assert_eq!(
            settings.detector.silence_threshold,
            DetectorConfig::default().silence_threshold
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: AppSettings =
            serde_json::from_str(r#"{"preferredInputDevice":" USB Mic "}"#).unwrap();
        let mut settings = parsed;
        settings.normalize();
        assert_eq!(settings.preferred_input_device.as_deref(), Some("USB Mic"));
        assert_eq!(settings.sensitivity, AlertPolicy::DEFAULT_SENSITIVITY);
        assert_eq!(settings.detector, DetectorConfig::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = std::env::temp_dir()
            .join(format!("sentinel-settings-{}", std::process::id()))
            .join("settings.json");
        let settings = AppSettings {
            sensitivity: 0.55,
            preferred_input_device: Some("Line In".into()),
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("sentinel-settings-does-not-exist.json");
        assert_eq!(load_settings(&path), AppSettings::default());
    }
}
