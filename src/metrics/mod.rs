//! Prometheus metrics exporter for the motion camera.
//!
//! With the `metrics` feature the exporter serves `/metrics`, a JSON
//! [`StatusReport`] on `/status`, and `/health`, which turns unavailable
//! once the camera has asked for a device restart.
//!
//! # Metrics Exposed
//!
//! ## Detection Readings
//! - `motion_cam_changed_blocks` - Changed blocks in the latest cycle
//! - `motion_cam_capacity_blocks` - Maximum changed blocks under the mask
//! - `motion_cam_brightness` - Average frame brightness
//! - `motion_cam_exposure`, `motion_cam_gain` - Sensor settings
//! - `motion_cam_consecutive_candidates` - Current candidate run
//! - `motion_cam_detection_state` - 0 disabled, 1 enabled, 2 paused
//!
//! ## Activity
//! - `motion_cam_cycles_total`, `motion_cam_triggers_total`,
//!   `motion_cam_suppressed_total`, `motion_cam_notifications_total`
//! - `motion_cam_images_stored_total`, `motion_cam_stream_frames_total`
//! - `motion_cam_rejected_requests_total`
//!
//! ## Faults
//! - `motion_cam_capture_failures_total` - Captures that returned no frame
//! - `motion_cam_mode_switch_failures_total` - Failed reinitialisations
//! - `motion_cam_power_cycles_total` - Camera power cycles
//! - `motion_cam_restarts_total` - Device restarts requested
//! - `motion_cam_busy_timeouts_total` - Operations abandoned on a busy camera
//!
//! # Example
//!
//! ```no_run
//! use motion_cam::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&MetricsSnapshot {
//!     changed_blocks: Some(20),
//!     capacity: 192,
//!     brightness: 131,
//!     ..Default::default()
//! });
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;
mod status;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
pub use status::StatusReport;
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
