//! Application configuration.
//!
//! Stored as TOML in the platform data directory. Every section has defaults
//! so a partial (or missing) file still loads.

use crate::recording::exporter_tcx::MergeOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Trainer connection settings
    pub sensors: SensorSettings,
    /// Simulated trainer settings
    pub simulator: SimulatorSettings,
    /// Recording and export settings
    pub recording: RecordingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            sensors: SensorSettings::default(),
            simulator: SimulatorSettings::default(),
            recording: RecordingSettings::default(),
        }
    }
}

/// Trainer connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// Discovery timeout in seconds
    pub discovery_timeout_secs: u64,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// How long to wait for the RequestControl acknowledgment
    pub control_ack_timeout_ms: u64,
    /// Connect to this device instead of the first FTMS trainer found
    pub device_id: Option<String>,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 30,
            connection_timeout_secs: 10,
            control_ack_timeout_ms: 3000,
            device_id: None,
        }
    }
}

impl SensorSettings {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn control_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.control_ack_timeout_ms)
    }
}

/// Simulated trainer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Interval between synthetic frames
    pub period_ms: u64,
    /// Power produced when no target is set
    pub base_power_watts: i16,
    pub base_speed_kmh: f64,
    pub base_cadence_rpm: f64,
    pub base_heart_rate_bpm: u8,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            period_ms: 250,
            base_power_watts: 150,
            base_speed_kmh: 28.0,
            base_cadence_rpm: 85.0,
            base_heart_rate_bpm: 120,
        }
    }
}

impl SimulatorSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }
}

/// Recording and export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Quiet period before a control change is sent
    pub control_debounce_ms: u64,
    /// Maximum distance between a trackpoint and a recorded second
    pub merge_tolerance_ms: i64,
    /// Largest TCX document accepted for merging
    pub max_document_bytes: usize,
    /// Where exported activities are written (data dir when unset)
    pub output_dir: Option<PathBuf>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        let merge = MergeOptions::default();
        Self {
            control_debounce_ms: 100,
            merge_tolerance_ms: merge.tolerance_ms,
            max_document_bytes: merge.max_document_bytes,
            output_dir: None,
        }
    }
}

impl RecordingSettings {
    pub fn control_debounce(&self) -> Duration {
        Duration::from_millis(self.control_debounce_ms)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            tolerance_ms: self.merge_tolerance_ms,
            max_document_bytes: self.max_document_bytes,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "spinbridge", "SpinBridge")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load application configuration from a file. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to a file.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
