//! Metrics collection and registry.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

use crate::camera::DetectionState;
use crate::capture::CameraDriver;
use crate::device::{EventSink, MotionCamera};
use crate::trigger::Clock;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of device state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Changed blocks in the latest detection cycle.
    pub changed_blocks: Option<u16>,
    /// Maximum changed blocks under the current mask.
    pub capacity: u16,
    /// Average brightness of the latest frame.
    pub brightness: u8,
    pub exposure: f32,
    pub gain: f32,
    /// Current run of candidate frames.
    pub consecutive: u8,
    /// 0 disabled, 1 enabled, 2 paused.
    pub detection: i64,
    pub cycles: u64,
    pub triggers: u64,
    pub suppressed: u64,
    pub notifications: u64,
    pub images_stored: u64,
    pub stream_frames: u64,
    pub rejected_requests: u64,
    pub capture_failures: u64,
    pub mode_switch_failures: u64,
    pub power_cycles: u64,
    pub restarts: u64,
    pub busy_timeouts: u64,
}

fn detection_code(state: DetectionState) -> i64 {
    match state {
        DetectionState::Disabled => 0,
        DetectionState::Enabled => 1,
        DetectionState::Paused => 2,
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the current state of the device.
    pub fn from_device<D, C, E>(camera: &MotionCamera<D, C, E>) -> Self
    where
        D: CameraDriver,
        C: Clock,
        E: EventSink,
    {
        let status = camera.status();
        let counters = camera.counters();
        let recovery = camera.recovery_stats();
        Self {
            changed_blocks: status.changed_blocks,
            capacity: status.capacity,
            brightness: status.brightness,
            exposure: status.exposure,
            gain: status.gain,
            consecutive: status.consecutive,
            detection: detection_code(status.detection),
            cycles: counters.cycles,
            triggers: counters.triggers,
            suppressed: counters.suppressed,
            notifications: counters.notifications,
            images_stored: counters.images_stored,
            stream_frames: counters.stream_frames,
            rejected_requests: counters.rejected_requests,
            capture_failures: recovery.capture_failures,
            mode_switch_failures: recovery.mode_switch_failures,
            power_cycles: recovery.power_cycles,
            restarts: recovery.restarts,
            busy_timeouts: camera.arbitrator().busy_timeouts(),
        }
    }
}

/// Prometheus metrics registry for the motion camera.
pub struct MetricsRegistry {
    registry: Registry,

    // Detection readings
    changed_blocks: IntGauge,
    capacity: IntGauge,
    brightness: IntGauge,
    exposure: Gauge,
    gain: Gauge,
    consecutive: IntGauge,
    detection_state: IntGauge,

    // Activity
    cycles_total: IntCounter,
    triggers_total: IntCounter,
    suppressed_total: IntCounter,
    notifications_total: IntCounter,
    images_stored_total: IntCounter,
    stream_frames_total: IntCounter,
    rejected_requests_total: IntCounter,

    // Faults
    capture_failures_total: IntCounter,
    mode_switch_failures_total: IntCounter,
    power_cycles_total: IntCounter,
    restarts_total: IntCounter,
    busy_timeouts_total: IntCounter,
}

/// Counters only move forward; bring `counter` up to `total`.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsRegistry {
    /// Creates a new registry with all motion camera metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let changed_blocks = IntGauge::new(
            "motion_cam_changed_blocks",
            "Changed blocks in the latest detection cycle",
        )?;
        let capacity = IntGauge::new(
            "motion_cam_capacity_blocks",
            "Maximum changed blocks under the current mask",
        )?;
        let brightness = IntGauge::new("motion_cam_brightness", "Average brightness of the latest frame")?;
        let exposure = Gauge::new("motion_cam_exposure", "Sensor exposure setting")?;
        let gain = Gauge::new("motion_cam_gain", "Sensor gain setting")?;
        let consecutive = IntGauge::new(
            "motion_cam_consecutive_candidates",
            "Current run of candidate frames",
        )?;
        let detection_state = IntGauge::new(
            "motion_cam_detection_state",
            "Detection state (0=disabled, 1=enabled, 2=paused)",
        )?;

        let cycles_total = IntCounter::new("motion_cam_cycles_total", "Detection cycles run")?;
        let triggers_total = IntCounter::new("motion_cam_triggers_total", "Motion triggers fired")?;
        let suppressed_total = IntCounter::new(
            "motion_cam_suppressed_total",
            "Classifier firings suppressed by the trigger gate",
        )?;
        let notifications_total = IntCounter::new("motion_cam_notifications_total", "Notifications sent")?;
        let images_stored_total = IntCounter::new("motion_cam_images_stored_total", "Snapshots stored")?;
        let stream_frames_total = IntCounter::new("motion_cam_stream_frames_total", "Stream frames sent")?;
        let rejected_requests_total = IntCounter::new(
            "motion_cam_rejected_requests_total",
            "Requests that failed or were rejected",
        )?;

        let capture_failures_total = IntCounter::new(
            "motion_cam_capture_failures_total",
            "Sensor captures that returned no frame",
        )?;
        let mode_switch_failures_total = IntCounter::new(
            "motion_cam_mode_switch_failures_total",
            "Failed sensor reinitialisations",
        )?;
        let power_cycles_total = IntCounter::new("motion_cam_power_cycles_total", "Camera power cycles")?;
        let restarts_total = IntCounter::new("motion_cam_restarts_total", "Device restarts requested")?;
        let busy_timeouts_total = IntCounter::new(
            "motion_cam_busy_timeouts_total",
            "Operations abandoned waiting for the camera",
        )?;

        registry.register(Box::new(changed_blocks.clone()))?;
        registry.register(Box::new(capacity.clone()))?;
        registry.register(Box::new(brightness.clone()))?;
        registry.register(Box::new(exposure.clone()))?;
        registry.register(Box::new(gain.clone()))?;
        registry.register(Box::new(consecutive.clone()))?;
        registry.register(Box::new(detection_state.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(triggers_total.clone()))?;
        registry.register(Box::new(suppressed_total.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(images_stored_total.clone()))?;
        registry.register(Box::new(stream_frames_total.clone()))?;
        registry.register(Box::new(rejected_requests_total.clone()))?;
        registry.register(Box::new(capture_failures_total.clone()))?;
        registry.register(Box::new(mode_switch_failures_total.clone()))?;
        registry.register(Box::new(power_cycles_total.clone()))?;
        registry.register(Box::new(restarts_total.clone()))?;
        registry.register(Box::new(busy_timeouts_total.clone()))?;

        Ok(Self {
            registry,
            changed_blocks,
            capacity,
            brightness,
            exposure,
            gain,
            consecutive,
            detection_state,
            cycles_total,
            triggers_total,
            suppressed_total,
            notifications_total,
            images_stored_total,
            stream_frames_total,
            rejected_requests_total,
            capture_failures_total,
            mode_switch_failures_total,
            power_cycles_total,
            restarts_total,
            busy_timeouts_total,
        })
    }

    /// Updates all metrics from a snapshot of device state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // A consumed reading leaves the last value in place.
        if let Some(changed) = snapshot.changed_blocks {
            self.changed_blocks.set(i64::from(changed));
        }
        self.capacity.set(i64::from(snapshot.capacity));
        self.brightness.set(i64::from(snapshot.brightness));
        self.exposure.set(f64::from(snapshot.exposure));
        self.gain.set(f64::from(snapshot.gain));
        self.consecutive.set(i64::from(snapshot.consecutive));
        self.detection_state.set(snapshot.detection);

        advance(&self.cycles_total, snapshot.cycles);
        advance(&self.triggers_total, snapshot.triggers);
        advance(&self.suppressed_total, snapshot.suppressed);
        advance(&self.notifications_total, snapshot.notifications);
        advance(&self.images_stored_total, snapshot.images_stored);
        advance(&self.stream_frames_total, snapshot.stream_frames);
        advance(&self.rejected_requests_total, snapshot.rejected_requests);

        advance(&self.capture_failures_total, snapshot.capture_failures);
        advance(&self.mode_switch_failures_total, snapshot.mode_switch_failures);
        advance(&self.power_cycles_total, snapshot.power_cycles);
        advance(&self.restarts_total, snapshot.restarts);
        advance(&self.busy_timeouts_total, snapshot.busy_timeouts);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockSensor;
    use crate::config::FileConfig;
    use crate::device::{NullSink, Request};
    use crate::trigger::ManualClock;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        let snapshot = MetricsSnapshot {
            changed_blocks: Some(20),
            capacity: 192,
            brightness: 128,
            exposure: 300.0,
            gain: 1.5,
            detection: 1,
            triggers: 2,
            power_cycles: 1,
            ..Default::default()
        };
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("motion_cam_changed_blocks 20"));
        assert!(output.contains("motion_cam_gain 1.5"));
        assert!(output.contains("motion_cam_triggers_total 2"));
        assert!(output.contains("motion_cam_power_cycles_total 1"));
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            triggers: 5,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            triggers: 3,
            ..Default::default()
        });
        assert!(registry.encode().unwrap().contains("motion_cam_triggers_total 5"));
    }

    #[test]
    fn test_snapshot_from_device() {
        let config = FileConfig::default();
        let sensor = MockSensor::new(config.capture.clone(), 100);
        let mut camera = MotionCamera::new(&config, sensor, ManualClock::new(), NullSink).unwrap();
        camera.start().unwrap();
        camera.tick(Some(Request::DisableDetection));

        let snapshot = MetricsSnapshot::from_device(&camera);
        assert_eq!(snapshot.detection, 0);
        assert_eq!(snapshot.capacity, 192);
        assert_eq!(snapshot.brightness, 100);
    }
}
