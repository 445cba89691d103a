//! Per-tick reports and the live status line.

use std::fmt;

use crate::camera::DetectionState;
use crate::exposure::ExposureAdjustment;
use crate::motion::Classification;
use crate::trigger::TriggerEvent;

use super::request::RequestOutcome;
use super::DeviceError;

/// Why a classifier firing did not become a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Inside the trigger rate limit.
    TooSoon,
    /// The sensor input gate is enabled and the input is low.
    SensorInputLow,
}

/// How a stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Disconnected,
    DurationCap,
    CaptureFailed,
}

/// What the detection phase of a tick did.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Detection not running and no stream active.
    Idle,
    Classified(Classification),
    Suppressed { changed: u16, reason: Suppression },
    Triggered { event: TriggerEvent, image: Option<u8> },
    StreamFrame { frames: u32 },
    StreamEnded { reason: StreamEnd, frames: u32 },
    Failed(DeviceError),
}

/// What the maintenance phase of a tick did.
#[derive(Debug, Clone)]
pub enum MaintenanceOutcome {
    /// The camera was busy; only timers ran.
    Skipped,
    Adjusted(ExposureAdjustment),
    Failed(DeviceError),
}

/// Everything that happened during one tick.
#[derive(Debug)]
pub struct TickReport {
    pub request: Option<Result<RequestOutcome, DeviceError>>,
    pub cycle: CycleOutcome,
    pub maintenance: Option<MaintenanceOutcome>,
}

impl TickReport {
    pub fn triggered(&self) -> Option<&TriggerEvent> {
        match &self.cycle {
            CycleOutcome::Triggered { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Live readings for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStatus {
    /// Changed blocks from the latest cycle, if not yet read.
    pub changed_blocks: Option<u16>,
    pub capacity: u16,
    pub brightness: u8,
    pub exposure: f32,
    pub gain: f32,
    pub consecutive: u8,
    pub detection: DetectionState,
    pub last_trigger: String,
    pub image_index: u8,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.changed_blocks {
            Some(changed) => write!(f, "Readings: {} changed out of {}", changed, self.capacity)?,
            None => write!(f, "Readings: n/a")?,
        }
        write!(
            f,
            " | brightness {} | exposure {:.0} gain {:.1} | detection {} | last trigger: {}",
            self.brightness, self.exposure, self.gain, self.detection, self.last_trigger
        )
    }
}

/// Running totals reported to metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub cycles: u64,
    pub triggers: u64,
    pub suppressed: u64,
    pub notifications: u64,
    pub images_stored: u64,
    pub stream_frames: u64,
    pub rejected_requests: u64,
}
