//! Exclusive-use arbitration of the single camera.
//!
//! Execution is cooperative and single-threaded, so this is a guard
//! against logical re-entrancy rather than a mutex: it stops one
//! multi-step camera operation (snapshot, stream) from starting while
//! another is still in flight across tick boundaries.

use std::time::Duration;

use crate::trigger::Clock;

use super::CameraFault;

/// Whether the periodic detection cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionState {
    /// Detection switched off by the user.
    Disabled,
    /// Detection runs every tick.
    #[default]
    Enabled,
    /// Temporarily suspended while an exclusive operation owns the camera.
    Paused,
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Operations that need the camera to themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveOp {
    /// Motion-triggered or on-demand JPEG snapshot.
    Snapshot,
    /// Single grayscale frame for live display.
    LiveView,
    /// Multi-tick JPEG stream.
    Stream,
    /// Illumination LED toggle.
    Illuminator,
    /// External sensor input handling.
    SensorInput,
}

impl std::fmt::Display for ExclusiveOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Snapshot => "snapshot",
            Self::LiveView => "live view",
            Self::Stream => "stream",
            Self::Illuminator => "illuminator",
            Self::SensorInput => "sensor input",
        };
        f.write_str(name)
    }
}

/// Arbitrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Idle,
    Busy {
        op: ExclusiveOp,
        /// Detection state to restore on release.
        resume: DetectionState,
    },
}

/// Proof of exclusive camera ownership. Must be handed back to
/// [`CameraArbitrator::release`].
#[derive(Debug)]
#[must_use = "an unreleased lease keeps the camera busy"]
pub struct ExclusiveLease {
    op: ExclusiveOp,
    acquired_ms: u32,
}

impl ExclusiveLease {
    pub fn op(&self) -> ExclusiveOp {
        self.op
    }

    pub fn acquired_ms(&self) -> u32 {
        self.acquired_ms
    }
}

/// Idle/Busy state machine owning the live [`DetectionState`].
#[derive(Debug, Clone)]
pub struct CameraArbitrator {
    state: ArbiterState,
    detection: DetectionState,
    poll_interval: Duration,
    poll_attempts: u32,
    busy_timeouts: u64,
}

impl CameraArbitrator {
    pub fn new(detection: DetectionState, poll_interval: Duration, poll_attempts: u32) -> Self {
        // A paused state never survives without a lease.
        let detection = match detection {
            DetectionState::Paused => DetectionState::Enabled,
            other => other,
        };
        Self {
            state: ArbiterState::Idle,
            detection,
            poll_interval,
            poll_attempts,
            busy_timeouts: 0,
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ArbiterState::Idle
    }

    pub fn detection(&self) -> DetectionState {
        self.detection
    }

    /// True when the periodic detection cycle may run.
    pub fn detection_active(&self) -> bool {
        self.is_idle() && self.detection == DetectionState::Enabled
    }

    pub fn busy_timeouts(&self) -> u64 {
        self.busy_timeouts
    }

    /// Turns detection on. While busy the change takes effect on release.
    pub fn enable(&mut self) {
        match &mut self.state {
            ArbiterState::Busy { resume, .. } => {
                *resume = DetectionState::Enabled;
                self.detection = DetectionState::Paused;
            }
            ArbiterState::Idle => self.detection = DetectionState::Enabled,
        }
    }

    /// Turns detection off, including the state restored after a lease.
    pub fn disable(&mut self) {
        if let ArbiterState::Busy { resume, .. } = &mut self.state {
            *resume = DetectionState::Disabled;
        }
        self.detection = DetectionState::Disabled;
    }

    /// Takes the camera, waiting up to the poll budget if it is busy.
    ///
    /// Detection is paused for the lifetime of the lease if it was enabled.
    pub fn acquire<C: Clock + ?Sized>(&mut self, op: ExclusiveOp, clock: &C) -> Result<ExclusiveLease, CameraFault> {
        if let ArbiterState::Busy { op: holder, .. } = self.state {
            tracing::info!(%op, %holder, "Waiting to use camera as it is already in use");
            let mut waited_ms: u64 = 0;
            for _ in 0..self.poll_attempts {
                clock.sleep(self.poll_interval);
                waited_ms += self.poll_interval.as_millis() as u64;
                if self.is_idle() {
                    break;
                }
            }
            if !self.is_idle() {
                self.busy_timeouts += 1;
                let fault = CameraFault::ResourceBusyTimeout { op, holder, waited_ms };
                tracing::warn!(error = %fault, "Waiting for camera to become free timed out");
                return Err(fault);
            }
        }

        let resume = self.detection;
        if self.detection == DetectionState::Enabled {
            self.detection = DetectionState::Paused;
        }
        self.state = ArbiterState::Busy { op, resume };
        tracing::debug!(%op, %resume, "Camera acquired");
        Ok(ExclusiveLease {
            op,
            acquired_ms: clock.now_ms(),
        })
    }

    /// Returns the camera and restores the detection state.
    pub fn release(&mut self, lease: ExclusiveLease) {
        match self.state {
            ArbiterState::Busy { op, resume } => {
                debug_assert_eq!(op, lease.op);
                self.detection = resume;
                self.state = ArbiterState::Idle;
                tracing::debug!(op = %lease.op, detection = %resume, "Camera released");
            }
            ArbiterState::Idle => {
                tracing::warn!(op = %lease.op, "Released a lease on an idle camera");
            }
        }
    }
}
