//! TOML device configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::RecoveryPolicy;
use crate::capture::CaptureConfig;

use super::geometry::GridGeometry;
use super::ConfigError;

/// Scheduler timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds between maintenance passes (auto exposure, brightness reading).
    pub maintenance_interval_secs: u16,
    /// Delay between checks while waiting for a busy camera.
    pub busy_poll_interval_ms: u32,
    /// Checks before giving up on a busy camera.
    pub busy_poll_attempts: u32,
    /// Absolute cap on a stream session.
    pub stream_max_secs: u16,
    /// JPEG capture attempts per snapshot.
    pub snapshot_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: 5,
            busy_poll_interval_ms: 100,
            busy_poll_attempts: 10,
            stream_max_secs: 20,
            snapshot_attempts: 3,
        }
    }
}

impl TimingConfig {
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.maintenance_interval_secs))
    }

    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.busy_poll_interval_ms))
    }

    pub fn stream_max(&self) -> Duration {
        Duration::from_secs(u64::from(self.stream_max_secs))
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub geometry: GridGeometry,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Flat settings file restored at startup, if present.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()?;
        self.capture
            .validate()
            .map_err(|e| ConfigError::InvalidGeometry(e.to_string()))?;
        if self.capture.frame_width != self.geometry.frame_width
            || self.capture.frame_height != self.geometry.frame_height
        {
            return Err(ConfigError::InvalidGeometry(format!(
                "capture frame {}x{} does not match grid frame {}x{}",
                self.capture.frame_width,
                self.capture.frame_height,
                self.geometry.frame_width,
                self.geometry.frame_height
            )));
        }
        if self.timing.busy_poll_attempts == 0 || self.timing.snapshot_attempts == 0 {
            return Err(ConfigError::ParseError("attempt counts must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [timing]
            stream_max_secs = 30

            [recovery]
            capture_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.stream_max_secs, 30);
        assert_eq!(config.timing.busy_poll_attempts, 10);
        assert_eq!(config.recovery.capture_attempts, 5);
        assert_eq!(config.geometry, GridGeometry::default());
    }

    #[test]
    fn test_mismatched_frame_rejected() {
        let result = FileConfig::from_toml(
            r#"
            [geometry]
            frame_width = 320
            frame_height = 240
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidGeometry(_))));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            FileConfig::from_toml("geometry = ["),
            Err(ConfigError::ParseError(_))
        ));
    }
}
