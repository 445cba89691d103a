//! Exposure and gain values pushed to the sensor.

use crate::capture::SensorSettings;

/// Exposure bounds accepted by the sensor.
pub const EXPOSURE_MAX: f32 = 1200.0;
/// Analogue gain bounds accepted by the sensor.
pub const GAIN_MAX: f32 = 30.0;

/// Current exposure, gain and brightness target.
///
/// Exposure and gain are fractional so that small controller steps
/// accumulate; the sensor receives them rounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureState {
    /// Manual exposure (0-1200).
    pub exposure: f32,
    /// Analogue gain (0-30).
    pub gain: f32,
    /// Brightness the controller converges on. 0 disables it.
    pub target_brightness: u8,
}

impl Default for ExposureState {
    fn default() -> Self {
        Self {
            exposure: 30.0,
            gain: 0.0,
            target_brightness: 130,
        }
    }
}

impl ExposureState {
    /// Returns a copy with exposure and gain inside the sensor bounds.
    pub fn clamped(self) -> Self {
        Self {
            exposure: self.exposure.clamp(0.0, EXPOSURE_MAX),
            gain: self.gain.clamp(0.0, GAIN_MAX),
            ..self
        }
    }

    /// True once exposure can go no higher.
    pub fn exposure_saturated(&self) -> bool {
        self.exposure >= EXPOSURE_MAX
    }

    /// Sensor register values for this state.
    pub fn sensor_settings(&self, invert: bool) -> SensorSettings {
        let clamped = self.clamped();
        SensorSettings {
            exposure: clamped.exposure.round() as u16,
            gain: clamped.gain.round() as u8,
            invert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped() {
        let state = ExposureState {
            exposure: 1500.0,
            gain: -1.0,
            target_brightness: 10,
        }
        .clamped();
        assert_eq!(state.exposure, 1200.0);
        assert_eq!(state.gain, 0.0);
        assert_eq!(state.target_brightness, 10);
    }

    #[test]
    fn test_sensor_settings_rounds() {
        let state = ExposureState {
            exposure: 41.6,
            gain: 2.5,
            target_brightness: 130,
        };
        let settings = state.sensor_settings(true);
        assert_eq!(settings.exposure, 42);
        assert_eq!(settings.gain, 3);
        assert!(settings.invert);
    }
}
