//! Motion Camera Library
//!
//! Block-luminance motion detection for a single-sensor security camera.
//! Grayscale frames are averaged into a coarse grid of blocks and compared
//! with the previous frame; enough changed blocks across enough
//! consecutive frames fire a rate-limited trigger, which stores a JPEG
//! snapshot and optionally notifies.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → motion (block grid, mask, classifier) → trigger → device events
//!     ↑                                                ↓
//!   camera (arbitration, recovery) ← exposure ← device scheduler
//! ```
//!
//! # Design Principles
//!
//! - **One sensor, one owner**: multi-step camera operations hold an
//!   exclusive lease and pause detection until they hand it back
//! - **Hardware is expected to fail**: captures retry, then the sensor is
//!   reinitialised, power cycled and finally the device restarts
//! - **Settings are validated at the edge**: out-of-range values are
//!   rejected and the previous value kept
//! - **Cooperative scheduling**: everything runs from [`MotionCamera::tick`]
//!   on one thread
//!
//! # Example
//!
//! ```no_run
//! use motion_cam::{
//!     capture::MockSensor,
//!     config::FileConfig,
//!     device::{MotionCamera, NullSink},
//!     trigger::SystemClock,
//! };
//!
//! let config = FileConfig::default();
//! let sensor = MockSensor::new(config.capture.clone(), 120);
//! let mut camera = MotionCamera::new(&config, sensor, SystemClock::new(), NullSink).unwrap();
//! camera.start().unwrap();
//!
//! for _ in 0..10 {
//!     let report = camera.tick(None);
//!     if report.triggered().is_some() {
//!         println!("{}", camera.take_status());
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod camera;
pub mod capture;
pub mod config;
pub mod device;
pub mod exposure;
pub mod metrics;
pub mod motion;
pub mod trigger;

// Re-export commonly used types at crate root
pub use camera::{CameraArbitrator, CameraFault, CameraRecovery, DetectionState, ExclusiveOp};
pub use capture::{CameraDriver, CameraError, CaptureConfig, MockSensor, PixelFormat, SensorFrame};
pub use config::{ConfigError, DetectionSettings, FileConfig, GridGeometry};
pub use device::{DeviceError, MotionCamera, Request, TickReport};
pub use exposure::{AutoExposureController, ExposureState};
pub use motion::{BlockAverager, Classification, FrameStore, MaskGrid, MotionClassifier};
pub use trigger::{Clock, SystemClock, TriggerGate};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
