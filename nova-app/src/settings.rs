//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nova_core::{DetectorConfig, EngineConfig, RecorderConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/upload_audio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub wake_label: String,
    pub wake_threshold: f32,
    pub wake_margin: f32,
    pub wake_consecutive: u32,
    pub wake_gain: i32,
    pub wake_cooldown_ms: u64,
    pub silence_threshold: u16,
    pub silence_ms: u64,
    pub min_record_ms: u64,
    pub max_record_ms: u64,
    pub record_gain: i32,
    pub earcons: bool,
    /// Loudness classifier calibration: mean level scored 0 and 1.
    pub stub_floor: u32,
    pub stub_loud: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            preferred_input_device: None,
            preferred_output_device: None,
            backend_url: DEFAULT_BACKEND_URL.into(),
            request_timeout_secs: 45,
            wake_label: engine.detector.wake_label.clone(),
            wake_threshold: engine.detector.threshold,
            wake_margin: engine.detector.margin,
            wake_consecutive: engine.detector.consecutive,
            wake_gain: engine.wake_gain,
            wake_cooldown_ms: engine.detector.cooldown.as_millis() as u64,
            silence_threshold: engine.recorder.silence_threshold,
            silence_ms: engine.recorder.silence_duration.as_millis() as u64,
            min_record_ms: engine.recorder.min_duration.as_millis() as u64,
            max_record_ms: engine.recorder.max_duration.as_millis() as u64,
            record_gain: engine.recorder.gain,
            earcons: engine.earcons,
            stub_floor: 300,
            stub_loud: 3_000,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = normalize_device_name(self.preferred_input_device.take());
        self.preferred_output_device = normalize_device_name(self.preferred_output_device.take());
        self.backend_url = self.backend_url.trim().to_string();
        if self.backend_url.is_empty() {
            self.backend_url = DEFAULT_BACKEND_URL.into();
        }
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 300);

        self.wake_label = self.wake_label.trim().to_string();
        if self.wake_label.is_empty() {
            self.wake_label = "nova".into();
        }
        self.wake_threshold = clamp_unit(self.wake_threshold, 0.60);
        self.wake_margin = clamp_unit(self.wake_margin, 0.10);
        self.wake_consecutive = self.wake_consecutive.clamp(1, 10);
        self.wake_gain = self.wake_gain.clamp(1, 32);
        self.wake_cooldown_ms = self.wake_cooldown_ms.min(60_000);

        self.silence_ms = self.silence_ms.clamp(100, 10_000);
        self.max_record_ms = self.max_record_ms.clamp(1_000, 120_000);
        self.min_record_ms = self.min_record_ms.min(self.max_record_ms);
        self.record_gain = self.record_gain.clamp(1, 16);
        self.stub_floor = self.stub_floor.min(u32::MAX - 1);
        self.stub_loud = self.stub_loud.max(self.stub_floor.saturating_add(1));
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Engine config with every tunable from these settings applied on top
    /// of the defaults.
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            wake_gain: self.wake_gain,
            earcons: self.earcons,
            detector: DetectorConfig {
                wake_label: self.wake_label.clone(),
                threshold: self.wake_threshold,
                margin: self.wake_margin,
                consecutive: self.wake_consecutive,
                cooldown: Duration::from_millis(self.wake_cooldown_ms),
                ..defaults.detector.clone()
            },
            recorder: RecorderConfig {
                silence_threshold: self.silence_threshold,
                silence_duration: Duration::from_millis(self.silence_ms),
                min_duration: Duration::from_millis(self.min_record_ms),
                max_duration: Duration::from_millis(self.max_record_ms),
                gain: self.record_gain,
                ..defaults.recorder.clone()
            },
            ..defaults
        }
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn normalize_device_name(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Nova")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("nova")
            .join("settings.json")
    }
}

/// Missing file means defaults; an unreadable or malformed one is logged and
/// also falls back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring malformed settings: {e}");
            AppSettings::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            warn!(path = %path.display(), "cannot read settings: {e}");
            AppSettings::default()
        }
    };
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
    fn defaults_produce_a_valid_engine_config() {
        let mut settings = AppSettings::default();
        settings.normalize();
        let config = settings.engine_config();
        config.validate().unwrap();
        assert_eq!(config.wake_gain, 8);
        assert_eq!(config.recorder.silence_duration, Duration::from_millis(1_000));
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut settings: AppSettings = serde_json::from_str(
            r#"{
                "backendUrl": "  ",
                "wakeLabel": " Nova ",
                "wakeThreshold": 3.5,
                "wakeConsecutive": 0,
                "minRecordMs": 90000,
                "maxRecordMs": 20000,
                "preferredInputDevice": "   "
            }"#,
        )
        .unwrap();
        settings.normalize();

        assert_eq!(settings.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(settings.wake_label, "Nova");
        assert_eq!(settings.wake_threshold, 1.0);
        assert_eq!(settings.wake_consecutive, 1);
        assert_eq!(settings.min_record_ms, 20_000);
        assert_eq!(settings.preferred_input_device, None);
        settings.engine_config().validate().unwrap();
    }

    #[test]
    fn extreme_stub_calibration_stays_ordered() {
        let mut settings: AppSettings =
            serde_json::from_str(r#"{ "stubFloor": 4294967295, "stubLoud": 10 }"#).unwrap();
        settings.normalize();
        assert!(settings.stub_loud > settings.stub_floor);
        assert_eq!(settings.stub_loud, u32::MAX);
    }

    #[test]
    fn wake_label_case_is_kept() {
        let mut settings = AppSettings {
            wake_label: "  Nova\t".into(),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.wake_label, "Nova");
        assert_eq!(settings.engine_config().detector.wake_label, "Nova");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = std::env::temp_dir().join(format!("nova-settings-{}", std::process::id()));
        let path = dir.join("settings.json");
        let settings = AppSettings {
            backend_url: "http://10.0.0.5:9000/voice".into(),
            wake_gain: 4,
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path);
        assert_eq!(loaded, settings);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let loaded = load_settings(Path::new("/definitely/not/here/settings.json"));
        assert_eq!(loaded, AppSettings::default());
    }
}
