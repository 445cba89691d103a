//! Camera input and frame handling.
//!
//! This module provides the sensor driver abstraction and the frame type
//! it produces. The sensor switches between grayscale (motion detection)
//! and JPEG (snapshots and streams); both are modelled here.

mod camera;
mod config;
mod frame;

pub use camera::{CameraDriver, CameraError, MockSensor, MockStats};
pub use config::{CaptureConfig, CaptureConfigError, SensorSettings};
pub use frame::{PixelFormat, SensorFrame, MIN_JPEG_BYTES};
