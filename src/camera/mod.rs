//! Camera ownership and failure recovery.
//!
//! The [`CameraArbitrator`] decides who may use the single sensor and owns
//! the live [`DetectionState`]; [`CameraRecovery`] switches pixel formats
//! and walks the escalation ladder when the sensor misbehaves.

mod arbitrator;
mod recovery;

pub use arbitrator::{ArbiterState, CameraArbitrator, DetectionState, ExclusiveLease, ExclusiveOp};
pub use recovery::{CameraRecovery, RecoveryPolicy, RecoveryStats};

use crate::capture::{CameraError, PixelFormat};

/// Faults raised by camera ownership and recovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraFault {
    #[error("capture failed after {attempts} attempts: {source}")]
    CaptureFailure { attempts: u32, source: CameraError },
    #[error("switch to {format} mode failed after {attempts} attempts")]
    ModeSwitchFailure { format: PixelFormat, attempts: u32 },
    #[error("camera did not recover after power cycle; device restart requested")]
    HardwareRecoveryFailure,
    #[error("{op} gave up after {waited_ms} ms waiting for {holder} to release the camera")]
    ResourceBusyTimeout {
        op: ExclusiveOp,
        holder: ExclusiveOp,
        waited_ms: u64,
    },
}
