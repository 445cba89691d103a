//! Closed-loop brightness control.

use super::state::ExposureState;

/// Default dead band around the target brightness.
pub const DEFAULT_HYSTERESIS: u8 = 20;

/// What one controller step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureAdjustment {
    /// Controller disabled (target 0).
    Disabled,
    /// Brightness inside the dead band.
    InBand,
    GainDown,
    ExposureDown,
    GainUp,
    ExposureUp,
    /// Outside the band but already at the relevant limit.
    Saturated,
}

impl ExposureAdjustment {
    /// True if the sensor settings need to be reapplied.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Self::GainDown | Self::ExposureDown | Self::GainUp | Self::ExposureUp
        )
    }
}

/// Steps exposure and gain toward the target brightness.
///
/// Gain is reduced before exposure when the scene is too bright, and only
/// raised once exposure is saturated when it is too dark. The exposure step
/// grows with the exposure value so convergence stays proportional.
#[derive(Debug, Clone)]
pub struct AutoExposureController {
    hysteresis: u8,
    gain_step: f32,
    exposure_step_divisor: f32,
    exposure_step_offset: f32,
}

impl Default for AutoExposureController {
    fn default() -> Self {
        Self {
            hysteresis: DEFAULT_HYSTERESIS,
            gain_step: 0.5,
            exposure_step_divisor: 25.0,
            exposure_step_offset: 0.2,
        }
    }
}

impl AutoExposureController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hysteresis(&self) -> u8 {
        self.hysteresis
    }

    /// Exposure step at the given exposure value.
    pub fn exposure_step(&self, exposure: f32) -> f32 {
        exposure / self.exposure_step_divisor + self.exposure_step_offset
    }

    /// Runs one control step against a brightness reading.
    pub fn adjust(&self, state: &mut ExposureState, brightness: u8) -> ExposureAdjustment {
        if state.target_brightness == 0 {
            return ExposureAdjustment::Disabled;
        }
        let target = i32::from(state.target_brightness);
        let band = i32::from(self.hysteresis);
        let measured = i32::from(brightness);
        let before = *state;

        let adjustment = if measured > target + band {
            if state.gain > 0.0 {
                state.gain -= self.gain_step;
                ExposureAdjustment::GainDown
            } else if state.exposure > 0.0 {
                state.exposure -= self.exposure_step(state.exposure);
                ExposureAdjustment::ExposureDown
            } else {
                ExposureAdjustment::Saturated
            }
        } else if measured < target - band {
            if state.exposure_saturated() {
                if state.gain < super::state::GAIN_MAX {
                    state.gain += self.gain_step;
                    ExposureAdjustment::GainUp
                } else {
                    ExposureAdjustment::Saturated
                }
            } else {
                state.exposure += self.exposure_step(state.exposure);
                ExposureAdjustment::ExposureUp
            }
        } else {
            ExposureAdjustment::InBand
        };

        *state = state.clamped();
        if adjustment.changed() {
            tracing::debug!(
                brightness,
                target = state.target_brightness,
                exposure_from = before.exposure,
                exposure = state.exposure,
                gain_from = before.gain,
                gain = state.gain,
                ?adjustment,
                "Auto exposure adjusted"
            );
        }
        adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(exposure: f32, gain: f32) -> ExposureState {
        ExposureState {
            exposure,
            gain,
            target_brightness: 130,
        }
    }

    #[test]
    fn test_bright_scene_lowers_exposure_when_no_gain() {
        let controller = AutoExposureController::new();
        let mut s = state(300.0, 0.0);
        let adjustment = controller.adjust(&mut s, 160);
        assert_eq!(adjustment, ExposureAdjustment::ExposureDown);
        assert!((s.exposure - (300.0 - (300.0 / 25.0 + 0.2))).abs() < 1e-4);
        assert_eq!(s.gain, 0.0);
    }

    #[test]
    fn test_bright_scene_lowers_gain_first() {
        let controller = AutoExposureController::new();
        let mut s = state(300.0, 4.0);
        assert_eq!(controller.adjust(&mut s, 200), ExposureAdjustment::GainDown);
        assert_eq!(s.gain, 3.5);
        assert_eq!(s.exposure, 300.0);
    }

    #[test]
    fn test_dark_scene_raises_exposure_until_saturated() {
        let controller = AutoExposureController::new();
        let mut s = state(100.0, 0.0);
        assert_eq!(controller.adjust(&mut s, 50), ExposureAdjustment::ExposureUp);
        assert!((s.exposure - 104.2).abs() < 1e-4);

        let mut s = state(1200.0, 0.0);
        assert_eq!(controller.adjust(&mut s, 50), ExposureAdjustment::GainUp);
        assert_eq!(s.gain, 0.5);
        assert_eq!(s.exposure, 1200.0);
    }

    #[test]
    fn test_inside_band_no_change() {
        let controller = AutoExposureController::new();
        let mut s = state(300.0, 2.0);
        for brightness in [110, 130, 150] {
            assert_eq!(controller.adjust(&mut s, brightness), ExposureAdjustment::InBand);
        }
        assert_eq!(s, state(300.0, 2.0));
    }

    #[test]
    fn test_zero_target_disables() {
        let controller = AutoExposureController::new();
        let mut s = ExposureState {
            target_brightness: 0,
            ..state(300.0, 0.0)
        };
        assert_eq!(controller.adjust(&mut s, 255), ExposureAdjustment::Disabled);
        assert_eq!(s.exposure, 300.0);
    }

    #[test]
    fn test_exposure_step_clamped_at_max() {
        let controller = AutoExposureController::new();
        let mut s = state(1190.0, 0.0);
        controller.adjust(&mut s, 0);
        assert_eq!(s.exposure, 1200.0);
    }

    proptest! {
        #[test]
        fn prop_state_stays_in_bounds(
            exposure in 0.0f32..=1200.0,
            gain in 0.0f32..=30.0,
            target in 1u8..=255,
            readings in proptest::collection::vec(any::<u8>(), 1..50),
        ) {
            let controller = AutoExposureController::new();
            let mut s = ExposureState { exposure, gain, target_brightness: target };
            for brightness in readings {
                controller.adjust(&mut s, brightness);
                prop_assert!((0.0..=1200.0).contains(&s.exposure));
                prop_assert!((0.0..=30.0).contains(&s.gain));
            }
        }
    }
}
