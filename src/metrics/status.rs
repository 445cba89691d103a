//! Status report served alongside the metrics.

use serde::Serialize;

use crate::device::CycleStatus;

/// Live readings for the `/status` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// The status line shown on the camera's own page.
    pub readings: String,
    pub changed_blocks: Option<u16>,
    pub capacity: u16,
    pub brightness: u8,
    pub exposure: f32,
    pub gain: f32,
    pub detection: String,
    pub last_trigger: String,
    pub image_index: u8,
    /// False once the camera has asked for a device restart.
    pub camera_ok: bool,
}

impl StatusReport {
    pub fn new(status: &CycleStatus, camera_ok: bool) -> Self {
        Self {
            readings: status.to_string(),
            changed_blocks: status.changed_blocks,
            capacity: status.capacity,
            brightness: status.brightness,
            exposure: status.exposure,
            gain: status.gain,
            detection: status.detection.to_string(),
            last_trigger: status.last_trigger.clone(),
            image_index: status.image_index,
            camera_ok,
        }
    }
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            readings: "Readings: n/a".to_string(),
            changed_blocks: None,
            capacity: 0,
            brightness: 0,
            exposure: 0.0,
            gain: 0.0,
            detection: String::new(),
            last_trigger: String::new(),
            image_index: 0,
            camera_ok: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DetectionState;

    #[test]
    fn test_report_carries_status_line() {
        let status = CycleStatus {
            changed_blocks: Some(20),
            capacity: 192,
            brightness: 131,
            exposure: 300.0,
            gain: 1.5,
            consecutive: 0,
            detection: DetectionState::Enabled,
            last_trigger: "Not since detection enabled".to_string(),
            image_index: 2,
        };
        let report = StatusReport::new(&status, true);
        assert!(report.readings.starts_with("Readings: 20 changed out of 192"));
        assert_eq!(report.detection, "enabled");
        assert!(report.camera_ok);
    }
}
