//! The device: every component wired into one cooperative scheduler.
//!
//! ```text
//!             Request ──→ MotionCamera::tick
//!                             │
//!     ┌───────────────────────┼──────────────────────────┐
//!     ↓                       ↓                          ↓
//!  handle_request      stream step | detection cycle   maintenance
//!     │                       │                          │
//!     └──── CameraArbitrator ─┴── CameraRecovery ────────┘
//!                             │
//!                        EventSink
//! ```

mod request;
mod scheduler;
mod status;

pub use request::{
    CaptureReason, CapturedImage, EventSink, NullSink, RecordingSink, Request, RequestOutcome, StreamSink,
};
pub use scheduler::{MotionCamera, NOT_SINCE_ENABLED};
pub use status::{
    CycleOutcome, CycleStatus, DeviceCounters, MaintenanceOutcome, StreamEnd, Suppression, TickReport,
};

use crate::camera::CameraFault;
use crate::capture::CameraError;
use crate::config::ConfigError;

/// Errors surfaced by device operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Camera(#[from] CameraFault),
    #[error("camera driver error: {0}")]
    Driver(#[from] CameraError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DeviceError {
    /// True if the device has asked for a full restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Camera(CameraFault::HardwareRecoveryFailure))
    }
}
