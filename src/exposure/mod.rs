//! Automatic exposure and gain control.

mod controller;
mod state;

pub use controller::{AutoExposureController, ExposureAdjustment, DEFAULT_HYSTERESIS};
pub use state::{ExposureState, EXPOSURE_MAX, GAIN_MAX};
