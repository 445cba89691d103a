//! Sensor configuration.
//!
//! Frame geometry for the two pixel formats plus the exposure and gain
//! values the auto exposure controller pushes to the sensor.

use serde::{Deserialize, Serialize};

/// Static sensor configuration used when (re)initialising the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Grayscale motion frame width in pixels.
    pub frame_width: u32,
    /// Grayscale motion frame height in pixels.
    pub frame_height: u32,
    /// JPEG snapshot width in pixels.
    pub jpeg_width: u32,
    /// JPEG snapshot height in pixels.
    pub jpeg_height: u32,
    /// JPEG quality (lower is better, 0-63).
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_width: 160,
            frame_height: 120,
            jpeg_width: 640,
            jpeg_height: 480,
            jpeg_quality: 10,
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration with the given motion frame dimensions.
    pub fn with_dimensions(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), CaptureConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(CaptureConfigError::InvalidDimensions);
        }
        if self.jpeg_width == 0 || self.jpeg_height == 0 {
            return Err(CaptureConfigError::InvalidDimensions);
        }
        if self.jpeg_quality > 63 {
            return Err(CaptureConfigError::InvalidQuality(self.jpeg_quality));
        }
        Ok(())
    }
}

/// Sensor values adjusted at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSettings {
    /// Manual exposure (0-1200).
    pub exposure: u16,
    /// Manual analogue gain (0-30).
    pub gain: u8,
    /// Flip the image vertically and horizontally.
    pub invert: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid jpeg quality {0} (must be 0-63)")]
    InvalidQuality(u8),
}
