//! Capturer configuration.
//!
//! Resolution and frame rate are fixed for the lifetime of a capturer;
//! changing them means building a new one.

use super::{Lens, Rotation};
use crate::delivery::StyleValue;
use crate::format::{FrameRate, Resolution};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for camera capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    /// Lens used by the first start.
    pub lens: Lens,
    /// Device index of the front-facing camera.
    pub front_device: u32,
    /// Device index of the back-facing camera.
    pub back_device: u32,
    /// Sensor rotation reported with synthetic frames, in degrees.
    pub rotation: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Medium,
            frame_rate: FrameRate::Fps30,
            lens: Lens::Front,
            front_device: 0,
            back_device: 1,
            rotation: 0,
        }
    }
}

impl CaptureConfig {
    pub fn new(resolution: Resolution, frame_rate: FrameRate) -> Self {
        Self {
            resolution,
            frame_rate,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.front_device == self.back_device {
            return Err(ConfigError::SharedDevice(self.front_device));
        }
        Rotation::try_from(self.rotation).map_err(|_| ConfigError::InvalidRotation(self.rotation))?;
        Ok(())
    }

    pub fn sensor_rotation(&self) -> Rotation {
        Rotation::try_from(self.rotation).unwrap_or_default()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("front and back lens both use device {0}")]
    SharedDevice(u32),
    #[error("invalid sensor rotation: {0} (must be 0, 90, 180 or 270)")]
    InvalidRotation(u32),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Demo run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run until interrupted (true) or deliver a fixed number of frames.
    pub continuous: bool,
    /// Number of frames to deliver if not continuous.
    pub frame_count: u32,
    /// Cycle the camera after this many frames (0 to disable).
    pub cycle_every: u32,
    /// Video scale style applied to the local view.
    pub video_scale: StyleValue,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 100,
            cycle_every: 0,
            video_scale: StyleValue::Fill,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lens, Lens::Front);
    }

    #[test]
    fn test_shared_device_invalid() {
        let config = CaptureConfig {
            back_device: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SharedDevice(0))));
    }

    #[test]
    fn test_parse_file_config() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            resolution = "HIGH_1080P"
            frame_rate = "FPS_15"
            lens = "back"
            rotation = 270

            [output]
            frame_count = 12
            cycle_every = 4
            video_scale = "fit"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.resolution, Resolution::High1080p);
        assert_eq!(config.capture.frame_rate, FrameRate::Fps15);
        assert_eq!(config.capture.lens, Lens::Back);
        assert_eq!(config.capture.sensor_rotation(), Rotation::Deg270);
        assert_eq!(config.output.frame_count, 12);
        assert_eq!(config.output.video_scale, StyleValue::Fit);
        assert_eq!(config.output.metrics_port, 9090);
    }

    #[test]
    fn test_invalid_rotation_rejected() {
        let result = FileConfig::from_toml("[capture]\nrotation = 45\n");
        assert!(matches!(result, Err(ConfigError::InvalidRotation(45))));
    }

    #[test]
    fn test_unknown_resolution_rejected() {
        let result = FileConfig::from_toml("[capture]\nresolution = \"ULTRA\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
