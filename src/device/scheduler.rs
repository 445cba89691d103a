//! The cooperative tick scheduler.
//!
//! Each [`MotionCamera::tick`] runs three phases in order: service at most
//! one request, run either one stream step or one detection cycle, then run
//! maintenance if its interval has elapsed. Nothing preempts a phase, so
//! all shared state is consistent at every tick boundary.

use crate::camera::{
    CameraArbitrator, CameraFault, CameraRecovery, DetectionState, ExclusiveLease, ExclusiveOp, RecoveryStats,
};
use crate::capture::{CameraDriver, CameraError, PixelFormat, SensorFrame};
use crate::config::{DetectionSettings, FileConfig, FlashMode, PersistedLoad, TimingConfig};
use crate::exposure::AutoExposureController;
use crate::motion::{Classification, FrameStore, MotionClassifier};
use crate::trigger::{Clock, TriggerEvent, TriggerGate};

use super::request::{CaptureReason, CapturedImage, EventSink, Request, RequestOutcome, StreamSink};
use super::status::{
    CycleOutcome, CycleStatus, DeviceCounters, MaintenanceOutcome, StreamEnd, Suppression, TickReport,
};
use super::DeviceError;

/// Description shown until the first trigger after detection is enabled.
pub const NOT_SINCE_ENABLED: &str = "Not since detection enabled";

struct StreamSession {
    sink: Box<dyn StreamSink>,
    lease: ExclusiveLease,
    started_ms: u32,
    frames: u32,
}

/// A motion-detecting camera built from one sensor driver, one clock and
/// one event sink.
pub struct MotionCamera<D, C, E> {
    driver: D,
    clock: C,
    events: E,
    settings: DetectionSettings,
    timing: TimingConfig,
    store: FrameStore,
    classifier: MotionClassifier,
    gate: TriggerGate,
    arbiter: CameraArbitrator,
    recovery: CameraRecovery,
    auto_exposure: AutoExposureController,
    stream: Option<StreamSession>,
    illuminator: bool,
    sensor_level: bool,
    /// Detection was enabled while the camera was busy; the baseline is
    /// recaptured when the lease is returned.
    baseline_pending: bool,
    last_maintenance_ms: u32,
    last_changed: Option<u16>,
    counters: DeviceCounters,
}

impl<D: CameraDriver, C: Clock, E: EventSink> MotionCamera<D, C, E> {
    /// Builds the device with factory settings. The sensor is untouched
    /// until [`MotionCamera::start`].
    ///
    /// The configuration is validated first; a geometry that does not
    /// divide into whole blocks and mask cells is rejected.
    pub fn new(config: &FileConfig, driver: D, clock: C, events: E) -> Result<Self, DeviceError> {
        config.validate()?;
        let settings = DetectionSettings::defaults(&config.geometry);
        let thresholds = settings.thresholds();
        let now = clock.now_ms();
        Ok(Self {
            store: FrameStore::new(&config.geometry),
            classifier: MotionClassifier::new(),
            gate: TriggerGate::new(thresholds.trigger_limit_secs, thresholds.notify_limit_secs, now),
            arbiter: CameraArbitrator::new(
                DetectionState::Enabled,
                config.timing.busy_poll_interval(),
                config.timing.busy_poll_attempts,
            ),
            recovery: CameraRecovery::new(config.recovery.clone()),
            auto_exposure: AutoExposureController::new(),
            timing: config.timing.clone(),
            stream: None,
            illuminator: false,
            sensor_level: false,
            baseline_pending: false,
            last_maintenance_ms: now,
            last_changed: None,
            counters: DeviceCounters::default(),
            driver,
            clock,
            events,
            settings,
        })
    }

    /// Initialises the sensor in grayscale and captures the first baseline.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        self.switch_mode(PixelFormat::Grayscale)?;
        self.capture_motion_frame()?;
        self.store.refresh_baseline();
        tracing::info!(
            detection = %self.arbiter.detection(),
            capacity = self.settings.capacity(),
            "Motion camera started"
        );
        Ok(())
    }

    /// Applies a persisted settings file. Rejected values keep their
    /// current setting and are listed in the returned report.
    pub fn load_persisted(&mut self, text: &str) -> PersistedLoad {
        let report = self.settings.load_persisted(text);
        self.sync_limits();
        match report.detection {
            Some(DetectionState::Disabled) => self.arbiter.disable(),
            Some(_) => self.arbiter.enable(),
            None => {}
        }
        if self.driver.current_format().is_some() {
            self.apply_sensor_settings();
        }
        report
    }

    /// Renders the current settings in the persisted layout.
    pub fn persisted(&self) -> String {
        self.settings.to_persisted(self.arbiter.detection())
    }

    /// Runs one scheduler tick.
    pub fn tick(&mut self, request: Option<Request>) -> TickReport {
        let request = request.map(|r| self.handle_request(r));
        let cycle = if self.stream.is_some() {
            self.stream_step()
        } else {
            self.detection_cycle()
        };
        let maintenance = self.maintenance();
        TickReport {
            request,
            cycle,
            maintenance,
        }
    }

    /// Services one request immediately.
    pub fn handle_request(&mut self, request: Request) -> Result<RequestOutcome, DeviceError> {
        let name = request.name();
        tracing::debug!(request = name, "Servicing request");
        let result = self.dispatch(request);
        if let Err(e) = &result {
            self.counters.rejected_requests += 1;
            tracing::warn!(request = name, error = %e, "Request failed");
        }
        result
    }

    fn dispatch(&mut self, request: Request) -> Result<RequestOutcome, DeviceError> {
        match request {
            Request::EnableDetection => self.enable_detection()?,
            Request::DisableDetection => {
                self.arbiter.disable();
                self.classifier.reset();
                tracing::info!("Motion detection disabled");
            }
            Request::RefreshBaseline => self.refresh_baseline()?,
            Request::ToggleMaskCell { column, row } => {
                let active = self.settings.toggle_mask_cell(column, row)?;
                tracing::info!(column, row, active, "Mask cell toggled");
            }
            Request::SetBlockThreshold(v) => self.settings.set_block_threshold(v)?,
            Request::SetImageThresholdLow(v) => self.settings.set_image_threshold_low(v)?,
            Request::SetImageThresholdHigh(v) => self.settings.set_image_threshold_high(v)?,
            Request::SetConsecutiveRequired(v) => {
                self.settings.set_consecutive_required(v)?;
                self.classifier.reset();
            }
            Request::SetTriggerLimit(v) => {
                self.settings.set_trigger_limit_secs(v)?;
                self.sync_limits();
            }
            Request::SetNotifyLimit(v) => {
                self.settings.set_notify_limit_secs(v)?;
                self.sync_limits();
            }
            Request::SetTargetBrightness(v) => self.settings.set_target_brightness(v)?,
            Request::SetExposure(v) => {
                self.settings.set_exposure(v)?;
                self.apply_manual_exposure();
            }
            Request::SetGain(v) => {
                self.settings.set_gain(v)?;
                self.apply_manual_exposure();
            }
            Request::SetInvert(on) => {
                self.settings.set_invert(on);
                self.apply_manual_exposure();
            }
            Request::SetFlash { enabled, mode } => {
                self.settings.set_use_flash(enabled);
                self.settings.set_flash_mode(mode);
            }
            Request::SetIoRequiredHigh(on) => self.settings.set_io_required_high(on),
            Request::ToggleNotify => {
                let on = !self.settings.notify_enabled();
                self.settings.set_notify_enabled(on);
                if on {
                    self.gate.rearm_notifications();
                }
                tracing::info!(enabled = on, "Email notifications toggled");
            }
            Request::ToggleIlluminator => self.toggle_illuminator()?,
            Request::RestoreDefaults => self.restore_defaults()?,
            Request::Snapshot => {
                let index = self.snapshot(CaptureReason::OnDemand)?;
                return Ok(RequestOutcome::ImageStored { index });
            }
            Request::LiveFrame => return self.live_frame().map(RequestOutcome::LiveFrame),
            Request::StartStream(sink) => {
                self.start_stream(sink)?;
                return Ok(RequestOutcome::StreamStarted);
            }
            Request::SensorInput(level) => self.sensor_input(level)?,
        }
        Ok(RequestOutcome::Applied)
    }

    fn detection_cycle(&mut self) -> CycleOutcome {
        if !self.arbiter.detection_active() {
            return CycleOutcome::Idle;
        }
        self.counters.cycles += 1;
        if let Err(e) = self.capture_motion_frame() {
            return CycleOutcome::Failed(e);
        }
        if self.baseline_pending {
            self.store.refresh_baseline();
            self.baseline_pending = false;
        }

        let thresholds = self.settings.thresholds();
        let classification = self.classifier.classify(
            self.store.current(),
            self.store.previous(),
            self.settings.mask(),
            &thresholds,
        );
        self.store.commit_frame(self.arbiter.detection());
        self.last_changed = Some(classification.changed_blocks());

        match classification {
            Classification::Fired { changed } => self.fire(changed),
            other => CycleOutcome::Classified(other),
        }
    }

    fn fire(&mut self, changed: u16) -> CycleOutcome {
        let now = self.clock.now_ms();
        if !self.gate.try_trigger(now) {
            self.counters.suppressed += 1;
            return CycleOutcome::Suppressed {
                changed,
                reason: Suppression::TooSoon,
            };
        }
        if self.settings.io_required_high() && !self.sensor_level {
            tracing::info!(changed, "Motion detected but io input low so ignored");
            self.counters.suppressed += 1;
            return CycleOutcome::Suppressed {
                changed,
                reason: Suppression::SensorInputLow,
            };
        }

        let event = TriggerEvent::new(now, changed, self.settings.capacity());
        tracing::info!(changed, capacity = event.capacity, "Camera detected motion");
        self.gate.record(&event);
        self.counters.triggers += 1;
        self.events.on_trigger(&event);

        let image = self.snapshot(CaptureReason::Motion);
        if self.settings.notify_enabled() && self.gate.try_notify(now) {
            self.counters.notifications += 1;
            self.events.on_notify(&event, image.is_ok());
        }
        self.gate.reset_timer(self.clock.now_ms());
        CycleOutcome::Triggered {
            event,
            image: image.ok(),
        }
    }

    fn maintenance(&mut self) -> Option<MaintenanceOutcome> {
        let interval_ms = self.timing.maintenance_interval().as_millis() as u32;
        if self.clock.elapsed_since(self.last_maintenance_ms) < interval_ms {
            return None;
        }
        self.last_maintenance_ms = self.clock.now_ms();
        if !self.arbiter.is_idle() {
            return Some(MaintenanceOutcome::Skipped);
        }

        self.driver.set_illuminator(self.illuminator);
        if self.arbiter.detection() == DetectionState::Disabled {
            // Brightness reading for the controller.
            if let Err(e) = self.capture_motion_frame() {
                return Some(MaintenanceOutcome::Failed(e));
            }
        }

        let mut state = self.settings.exposure();
        let adjustment = self.auto_exposure.adjust(&mut state, self.store.brightness());
        if adjustment.changed() {
            self.settings.store_exposure(state);
            self.apply_sensor_settings();
            // Recapture so the adjustment is not seen as motion.
            if let Err(e) = self.capture_motion_frame() {
                return Some(MaintenanceOutcome::Failed(e));
            }
            self.store.refresh_baseline();
        }
        Some(MaintenanceOutcome::Adjusted(adjustment))
    }

    fn enable_detection(&mut self) -> Result<(), DeviceError> {
        self.arbiter.enable();
        self.classifier.reset();
        self.gate.reset_timer(self.clock.now_ms());
        self.gate.set_description(NOT_SINCE_ENABLED);
        tracing::info!("Motion detection enabled");
        if self.arbiter.is_idle() {
            self.refresh_baseline()?;
        } else {
            self.baseline_pending = true;
        }
        Ok(())
    }

    fn refresh_baseline(&mut self) -> Result<(), DeviceError> {
        let lease = self.arbiter.acquire(ExclusiveOp::LiveView, &self.clock)?;
        let result = self.capture_motion_frame();
        if result.is_ok() {
            self.store.refresh_baseline();
        }
        self.arbiter.release(lease);
        result.map(drop)
    }

    fn restore_defaults(&mut self) -> Result<(), DeviceError> {
        self.settings.restore_defaults();
        self.sync_limits();
        self.apply_sensor_settings();
        self.enable_detection()
    }

    fn toggle_illuminator(&mut self) -> Result<(), DeviceError> {
        let lease = self.arbiter.acquire(ExclusiveOp::Illuminator, &self.clock)?;
        self.illuminator = !self.illuminator;
        self.driver.set_illuminator(self.illuminator);
        self.gate.reset_timer(self.clock.now_ms());
        self.arbiter.release(lease);
        tracing::info!(on = self.illuminator, "Illumination LED toggled");
        Ok(())
    }

    fn sensor_input(&mut self, level: bool) -> Result<(), DeviceError> {
        if level == self.sensor_level {
            return Ok(());
        }
        let lease = self.arbiter.acquire(ExclusiveOp::SensorInput, &self.clock)?;
        self.sensor_level = level;
        tracing::info!(level, "IO input has triggered");
        self.events.on_sensor_input(level);
        self.gate.reset_timer(self.clock.now_ms());
        self.arbiter.release(lease);
        Ok(())
    }

    fn live_frame(&mut self) -> Result<SensorFrame, DeviceError> {
        let lease = self.arbiter.acquire(ExclusiveOp::LiveView, &self.clock)?;
        let result = self
            .recovery
            .capture_once(&mut self.driver, PixelFormat::Grayscale, &self.clock);
        self.arbiter.release(lease);
        result.map_err(DeviceError::from)
    }

    /// Takes a snapshot under an exclusive lease and stores it in the next
    /// image slot.
    fn snapshot(&mut self, reason: CaptureReason) -> Result<u8, DeviceError> {
        let lease = self.arbiter.acquire(ExclusiveOp::Snapshot, &self.clock)?;
        let result = self.capture_snapshot(reason);
        if self.settings.use_flash() {
            self.driver.set_illuminator(self.illuminator);
        }
        self.gate.reset_timer(self.clock.now_ms());
        self.arbiter.release(lease);

        match &result {
            Ok(index) => {
                self.counters.images_stored += 1;
                tracing::info!(index, ?reason, "Image stored");
            }
            Err(e) => tracing::error!(error = %e, "Unable to capture/store image"),
        }
        result
    }

    fn capture_snapshot(&mut self, reason: CaptureReason) -> Result<u8, DeviceError> {
        let index = self.settings.next_image_index();
        let preview = match self.driver.capture() {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Grayscale preview capture failed");
                None
            }
        };

        self.switch_mode(PixelFormat::Jpeg)?;
        let jpeg = self.capture_jpeg();
        let restored = self.switch_mode(PixelFormat::Grayscale);
        let jpeg = jpeg?;
        self.events.on_image(&CapturedImage {
            index,
            reason,
            preview,
            jpeg,
        });
        restored?;
        Ok(index)
    }

    fn capture_jpeg(&mut self) -> Result<SensorFrame, DeviceError> {
        let use_flash = self.settings.use_flash();
        let mode = self.settings.flash_mode();
        let flash_before = use_flash
            && match mode {
                FlashMode::WhenDark => self.settings.exposure().gain > 0.0,
                FlashMode::Always => true,
                FlashMode::AfterCapture => false,
            };

        let attempts = self.timing.snapshot_attempts.max(1);
        let mut last = CameraError::CaptureFailed;
        for attempt in 1..=attempts {
            tracing::debug!(attempt, "Taking a photo");
            if flash_before {
                self.driver.set_illuminator(true);
            }
            let result = self
                .recovery
                .capture_once(&mut self.driver, PixelFormat::Jpeg, &self.clock);
            if use_flash {
                self.driver.set_illuminator(mode == FlashMode::AfterCapture);
            }
            match result {
                Ok(frame) if frame.is_valid() => return Ok(frame),
                Ok(frame) => {
                    let bytes = frame.data().len();
                    tracing::warn!(attempt, bytes, "Captured image too small");
                    last = CameraError::UnexpectedFrame(format!("jpeg of {bytes} bytes"));
                }
                Err(CameraFault::CaptureFailure { source, .. }) => last = source,
                Err(fault) => return Err(fault.into()),
            }
        }
        Err(CameraFault::CaptureFailure { attempts, source: last }.into())
    }

    fn start_stream(&mut self, sink: Box<dyn StreamSink>) -> Result<(), DeviceError> {
        let lease = self.arbiter.acquire(ExclusiveOp::Stream, &self.clock)?;
        if let Err(e) = self.switch_mode(PixelFormat::Jpeg) {
            self.arbiter.release(lease);
            return Err(e);
        }
        tracing::info!(max_secs = self.timing.stream_max_secs, "Live stream started");
        self.stream = Some(StreamSession {
            sink,
            lease,
            started_ms: self.clock.now_ms(),
            frames: 0,
        });
        Ok(())
    }

    fn stream_step(&mut self) -> CycleOutcome {
        let Some(mut session) = self.stream.take() else {
            return CycleOutcome::Idle;
        };

        let cap_ms = self.timing.stream_max().as_millis() as u32;
        let end = if self.clock.elapsed_since(session.started_ms) >= cap_ms {
            Some(StreamEnd::DurationCap)
        } else if !session.sink.is_connected() {
            Some(StreamEnd::Disconnected)
        } else {
            match self
                .recovery
                .capture_once(&mut self.driver, PixelFormat::Jpeg, &self.clock)
            {
                Ok(frame) => {
                    if session.sink.send_frame(&frame) {
                        session.frames += 1;
                        self.counters.stream_frames += 1;
                        None
                    } else {
                        Some(StreamEnd::Disconnected)
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream capture failed");
                    Some(StreamEnd::CaptureFailed)
                }
            }
        };

        match end {
            None => {
                let frames = session.frames;
                self.stream = Some(session);
                CycleOutcome::StreamFrame { frames }
            }
            Some(reason) => self.finish_stream(session, reason),
        }
    }

    fn finish_stream(&mut self, session: StreamSession, reason: StreamEnd) -> CycleOutcome {
        let frames = session.frames;
        tracing::info!(frames, ?reason, "Video stream stopped");
        match self.switch_mode(PixelFormat::Grayscale) {
            Ok(()) if self.baseline_pending => {
                // Still under the stream lease.
                match self.capture_motion_frame() {
                    Ok(_) => {
                        self.store.refresh_baseline();
                        self.baseline_pending = false;
                    }
                    Err(e) => tracing::warn!(error = %e, "Baseline refresh after stream failed"),
                }
            }
            Ok(()) => {}
            Err(e) => tracing::error!(error = %e, "Failed to return camera to motion mode"),
        }
        self.gate.reset_timer(self.clock.now_ms());
        self.arbiter.release(session.lease);
        CycleOutcome::StreamEnded { reason, frames }
    }

    /// Switches pixel format and reapplies sensor settings. A successful
    /// switch restarts the trigger interval.
    fn switch_mode(&mut self, target: PixelFormat) -> Result<(), DeviceError> {
        self.recovery.switch_mode(&mut self.driver, target, &self.clock)?;
        self.apply_sensor_settings();
        self.gate.reset_timer(self.clock.now_ms());
        Ok(())
    }

    /// Captures into the frame store, walking the recovery ladder on failure.
    fn capture_motion_frame(&mut self) -> Result<u8, DeviceError> {
        let power_cycles = self.recovery.stats().power_cycles;
        let store = &mut self.store;
        let result = self.recovery.capture_with_retry(
            &mut self.driver,
            PixelFormat::Grayscale,
            &self.clock,
            |driver| store.capture_frame(driver),
        );
        if self.recovery.stats().power_cycles != power_cycles {
            self.apply_sensor_settings();
            self.gate.reset_timer(self.clock.now_ms());
        }
        result.map_err(DeviceError::from)
    }

    fn apply_manual_exposure(&mut self) {
        if self.driver.current_format().is_some() {
            self.apply_sensor_settings();
        }
        self.gate.reset_timer(self.clock.now_ms());
    }

    fn apply_sensor_settings(&mut self) {
        let settings = self.settings.exposure().sensor_settings(self.settings.invert());
        if let Err(e) = self.driver.apply_settings(&settings) {
            tracing::warn!(error = %e, "Failed to apply sensor settings");
        }
    }

    fn sync_limits(&mut self) {
        let thresholds = self.settings.thresholds();
        self.gate.set_trigger_limit_secs(thresholds.trigger_limit_secs);
        self.gate.set_notify_limit_secs(thresholds.notify_limit_secs);
    }

    /// Current readings without consuming the changed-block reading.
    pub fn status(&self) -> CycleStatus {
        let exposure = self.settings.exposure();
        CycleStatus {
            changed_blocks: self.last_changed,
            capacity: self.settings.capacity(),
            brightness: self.store.brightness(),
            exposure: exposure.exposure,
            gain: exposure.gain,
            consecutive: self.classifier.consecutive(),
            detection: self.arbiter.detection(),
            last_trigger: self.gate.last_record().description.clone(),
            image_index: self.settings.image_index(),
        }
    }

    /// Current readings for display. The changed-block reading is cleared
    /// so each cycle's count is shown once.
    pub fn take_status(&mut self) -> CycleStatus {
        let status = self.status();
        self.last_changed = None;
        status
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn detection(&self) -> DetectionState {
        self.arbiter.detection()
    }

    pub fn arbitrator(&self) -> &CameraArbitrator {
        &self.arbiter
    }

    pub fn frame_store(&self) -> &FrameStore {
        &self.store
    }

    pub fn trigger_gate(&self) -> &TriggerGate {
        &self.gate
    }

    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery.stats()
    }

    pub fn counters(&self) -> DeviceCounters {
        self.counters
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn illuminator(&self) -> bool {
        self.illuminator
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn events(&self) -> &E {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::capture::MockSensor;
    use crate::config::ConfigError;
    use crate::device::RecordingSink;
    use crate::exposure::ExposureAdjustment;
    use crate::trigger::ManualClock;

    type TestCamera = MotionCamera<MockSensor, ManualClock, RecordingSink>;

    fn camera_with(sensor: impl FnOnce(MockSensor) -> MockSensor) -> (TestCamera, ManualClock) {
        let config = FileConfig::default();
        let clock = ManualClock::starting_at(1_000);
        let sensor = sensor(MockSensor::new(config.capture.clone(), 100));
        let mut camera = MotionCamera::new(&config, sensor, clock.clone(), RecordingSink::default()).unwrap();
        camera.start().unwrap();
        (camera, clock)
    }

    fn camera() -> (TestCamera, ManualClock) {
        camera_with(|s| s)
    }

    /// Moves past the boot trigger interval with one quiet tick.
    fn settle(camera: &mut TestCamera, clock: &ManualClock) {
        clock.advance(21_000);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Classified(Classification::Rejected { changed: 0 })
        ));
    }

    /// 5×4 blocks of the default 16×12 grid.
    fn paint_motion(camera: &mut TestCamera, level: u8) {
        camera.driver_mut().paint_rect(0, 0, 50, 40, level);
    }

    #[derive(Clone)]
    struct SharedSink {
        connected: Rc<Cell<bool>>,
        frames: Rc<Cell<u32>>,
    }

    impl SharedSink {
        fn new() -> Self {
            Self {
                connected: Rc::new(Cell::new(true)),
                frames: Rc::new(Cell::new(0)),
            }
        }
    }

    impl StreamSink for SharedSink {
        fn is_connected(&self) -> bool {
            self.connected.get()
        }

        fn send_frame(&mut self, frame: &SensorFrame) -> bool {
            assert_eq!(frame.format(), PixelFormat::Jpeg);
            self.frames.set(self.frames.get() + 1);
            true
        }
    }

    #[test]
    fn test_start_initialises_grayscale() {
        let (camera, _) = camera();
        assert_eq!(camera.driver().current_format(), Some(PixelFormat::Grayscale));
        assert_eq!(camera.frame_store().brightness(), 100);
        assert!(!camera.frame_store().has_uncommitted());
        assert_eq!(camera.detection(), DetectionState::Enabled);
    }

    #[test]
    fn test_no_trigger_right_after_start() {
        let (mut camera, _) = camera();
        paint_motion(&mut camera, 200);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Suppressed {
                changed: 20,
                reason: Suppression::TooSoon
            }
        ));
        assert!(camera.events().triggers.is_empty());
    }

    #[test]
    fn test_motion_triggers_snapshot() {
        let (mut camera, clock) = camera();
        settle(&mut camera, &clock);

        paint_motion(&mut camera, 200);
        let report = camera.tick(None);
        let event = report.triggered().expect("motion should trigger");
        assert_eq!(event.changed_blocks, 20);
        assert!(event.description.ends_with("20 out of 192"));
        assert!(matches!(report.cycle, CycleOutcome::Triggered { image: Some(1), .. }));

        let events = camera.events();
        assert_eq!(events.triggers.len(), 1);
        assert_eq!(events.images.len(), 1);
        assert_eq!(events.images[0].reason, CaptureReason::Motion);
        assert!(events.images[0].jpeg.is_valid());
        assert!(events.notifications.is_empty());

        assert_eq!(camera.driver().current_format(), Some(PixelFormat::Grayscale));
        assert_eq!(camera.detection(), DetectionState::Enabled);
        assert_eq!(camera.status().last_trigger, event.description);
    }

    #[test]
    fn test_retrigger_too_soon() {
        let (mut camera, clock) = camera();
        settle(&mut camera, &clock);
        paint_motion(&mut camera, 200);
        assert!(camera.tick(None).triggered().is_some());

        clock.advance(5_000);
        paint_motion(&mut camera, 100);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Suppressed {
                reason: Suppression::TooSoon,
                ..
            }
        ));
        assert_eq!(camera.counters().triggers, 1);
        assert_eq!(camera.counters().suppressed, 1);
    }

    #[test]
    fn test_first_trigger_notifies() {
        let (mut camera, clock) = camera();
        camera.handle_request(Request::ToggleNotify).unwrap();
        settle(&mut camera, &clock);

        paint_motion(&mut camera, 200);
        camera.tick(None);
        let notifications = &camera.events().notifications;
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].1);
    }

    #[test]
    fn test_sensor_input_gate() {
        let (mut camera, clock) = camera();
        camera.handle_request(Request::SetIoRequiredHigh(true)).unwrap();
        settle(&mut camera, &clock);

        paint_motion(&mut camera, 200);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Suppressed {
                reason: Suppression::SensorInputLow,
                ..
            }
        ));

        camera.handle_request(Request::SensorInput(true)).unwrap();
        assert_eq!(camera.events().sensor_inputs, vec![true]);
        // Same level again is not a change.
        camera.handle_request(Request::SensorInput(true)).unwrap();
        assert_eq!(camera.events().sensor_inputs.len(), 1);

        clock.advance(21_000);
        paint_motion(&mut camera, 100);
        assert!(camera.tick(None).triggered().is_some());
    }

    #[test]
    fn test_on_demand_snapshot() {
        let (mut camera, _) = camera();
        let outcome = camera.handle_request(Request::Snapshot).unwrap();
        assert!(matches!(outcome, RequestOutcome::ImageStored { index: 1 }));
        let outcome = camera.handle_request(Request::Snapshot).unwrap();
        assert!(matches!(outcome, RequestOutcome::ImageStored { index: 2 }));

        let image = &camera.events().images[0];
        assert_eq!(image.reason, CaptureReason::OnDemand);
        assert_eq!(image.preview.as_ref().map(SensorFrame::format), Some(PixelFormat::Grayscale));
        assert_eq!(camera.settings().image_index(), 2);
        assert!(camera.arbitrator().is_idle());
        assert_eq!(camera.detection(), DetectionState::Enabled);
    }

    #[test]
    fn test_snapshot_flash_restores_illuminator() {
        let (mut camera, _) = camera();
        camera
            .handle_request(Request::SetFlash {
                enabled: true,
                mode: FlashMode::AfterCapture,
            })
            .unwrap();
        camera.handle_request(Request::Snapshot).unwrap();
        assert!(!camera.driver().illuminator());

        camera.handle_request(Request::ToggleIlluminator).unwrap();
        camera.handle_request(Request::Snapshot).unwrap();
        assert!(camera.driver().illuminator());
        assert!(camera.illuminator());
    }

    #[test]
    fn test_live_frame_is_grayscale() {
        let (mut camera, _) = camera();
        match camera.handle_request(Request::LiveFrame).unwrap() {
            RequestOutcome::LiveFrame(frame) => assert_eq!(frame.format(), PixelFormat::Grayscale),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_stream_runs_until_duration_cap() {
        let (mut camera, clock) = camera();
        let sink = SharedSink::new();

        let report = camera.tick(Some(Request::StartStream(Box::new(sink.clone()))));
        assert!(matches!(report.request, Some(Ok(RequestOutcome::StreamStarted))));
        assert!(matches!(report.cycle, CycleOutcome::StreamFrame { frames: 1 }));
        assert_eq!(camera.detection(), DetectionState::Paused);
        assert_eq!(camera.driver().current_format(), Some(PixelFormat::Jpeg));

        for expected in 2..=4 {
            clock.advance(5_000);
            let report = camera.tick(None);
            assert!(matches!(report.cycle, CycleOutcome::StreamFrame { frames } if frames == expected));
            assert!(matches!(report.maintenance, Some(MaintenanceOutcome::Skipped)));
        }

        clock.advance(5_000);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::StreamEnded {
                reason: StreamEnd::DurationCap,
                frames: 4
            }
        ));
        assert_eq!(sink.frames.get(), 4);
        assert!(!camera.is_streaming());
        assert_eq!(camera.detection(), DetectionState::Enabled);
        assert_eq!(camera.driver().current_format(), Some(PixelFormat::Grayscale));
    }

    #[test]
    fn test_stream_ends_on_disconnect() {
        let (mut camera, _) = camera();
        let sink = SharedSink::new();
        camera.tick(Some(Request::StartStream(Box::new(sink.clone()))));

        sink.connected.set(false);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::StreamEnded {
                reason: StreamEnd::Disconnected,
                frames: 1
            }
        ));
        assert!(camera.arbitrator().is_idle());
    }

    #[test]
    fn test_sensor_input_rejected_while_busy_is_reported_later() {
        let (mut camera, _) = camera();
        let sink = SharedSink::new();
        camera.tick(Some(Request::StartStream(Box::new(sink.clone()))));

        let err = camera.handle_request(Request::SensorInput(true)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Camera(CameraFault::ResourceBusyTimeout {
                op: ExclusiveOp::SensorInput,
                ..
            })
        ));
        assert!(camera.events().sensor_inputs.is_empty());

        sink.connected.set(false);
        camera.tick(None);
        assert!(camera.arbitrator().is_idle());

        camera.handle_request(Request::SensorInput(true)).unwrap();
        assert_eq!(camera.events().sensor_inputs, vec![true]);
    }

    #[test]
    fn test_enable_during_stream_rebaselines_on_release() {
        let (mut camera, clock) = camera();
        camera.handle_request(Request::SetTargetBrightness(0)).unwrap();
        camera.handle_request(Request::SetTriggerLimit(1)).unwrap();
        camera.handle_request(Request::DisableDetection).unwrap();

        // The scene changes while nobody is watching.
        paint_motion(&mut camera, 200);
        let sink = SharedSink::new();
        camera
            .handle_request(Request::StartStream(Box::new(sink.clone())))
            .unwrap();
        camera.handle_request(Request::EnableDetection).unwrap();
        assert_eq!(camera.detection(), DetectionState::Paused);

        sink.connected.set(false);
        assert!(matches!(camera.tick(None).cycle, CycleOutcome::StreamEnded { .. }));
        assert_eq!(camera.detection(), DetectionState::Enabled);

        clock.advance(2_000);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Classified(Classification::Rejected { changed: 0 })
        ));
        assert!(camera.events().triggers.is_empty());
    }

    #[test]
    fn test_new_rejects_degenerate_geometry() {
        let mut config = FileConfig::default();
        config.geometry.block_size = 0;
        let sensor = MockSensor::new(config.capture.clone(), 100);
        let result = MotionCamera::new(&config, sensor, ManualClock::new(), RecordingSink::default());
        assert!(matches!(result, Err(DeviceError::Config(ConfigError::InvalidGeometry(_)))));

        // 2 block columns cannot hold a 4-column mask.
        let mut config = FileConfig::default();
        config.geometry.frame_width = 20;
        config.capture.frame_width = 20;
        let sensor = MockSensor::new(config.capture.clone(), 100);
        let result = MotionCamera::new(&config, sensor, ManualClock::new(), RecordingSink::default());
        assert!(matches!(result, Err(DeviceError::Config(ConfigError::InvalidGeometry(_)))));
    }

    #[test]
    fn test_request_during_stream_times_out_without_camera_access() {
        let (mut camera, clock) = camera();
        camera.tick(Some(Request::StartStream(Box::new(SharedSink::new()))));

        let accesses = camera.driver().stats().accesses();
        let slept = clock.total_slept_ms();
        let err = camera.handle_request(Request::Snapshot).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Camera(CameraFault::ResourceBusyTimeout {
                op: ExclusiveOp::Snapshot,
                holder: ExclusiveOp::Stream,
                ..
            })
        ));
        assert_eq!(camera.driver().stats().accesses(), accesses);
        assert_eq!(clock.total_slept_ms() - slept, 1_000);
        assert!(camera.is_streaming());
        assert_eq!(camera.counters().rejected_requests, 1);
    }

    #[test]
    fn test_disabled_detection_skips_cycle_and_commit() {
        let (mut camera, clock) = camera();
        camera.handle_request(Request::DisableDetection).unwrap();
        assert!(matches!(camera.tick(None).cycle, CycleOutcome::Idle));

        // Scene changes while disabled; maintenance still reads brightness.
        paint_motion(&mut camera, 200);
        clock.advance(5_000);
        let report = camera.tick(None);
        assert!(matches!(report.maintenance, Some(MaintenanceOutcome::Adjusted(_))));
        assert!(camera.frame_store().brightness() > 100);
        assert!(camera.frame_store().has_uncommitted());

        // Enabling refreshes the baseline so the old change is not motion.
        camera.handle_request(Request::EnableDetection).unwrap();
        assert_eq!(camera.status().last_trigger, NOT_SINCE_ENABLED);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Classified(Classification::Rejected { changed: 0 })
        ));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let (mut camera, _) = camera();
        let err = camera.handle_request(Request::SetBlockThreshold(0)).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Config(ConfigError::InvalidConfiguration {
                field: "block threshold",
                ..
            })
        ));
        assert_eq!(camera.settings().thresholds().block_threshold, 7);
    }

    #[test]
    fn test_mask_toggle_excludes_motion() {
        let (mut camera, clock) = camera();
        camera
            .handle_request(Request::ToggleMaskCell { column: 0, row: 0 })
            .unwrap();
        camera
            .handle_request(Request::ToggleMaskCell { column: 1, row: 0 })
            .unwrap();
        assert_eq!(camera.settings().capacity(), 160);
        settle(&mut camera, &clock);

        // All 20 painted blocks sit under the two disabled cells.
        paint_motion(&mut camera, 200);
        let report = camera.tick(None);
        assert!(matches!(
            report.cycle,
            CycleOutcome::Classified(Classification::Rejected { changed: 0 })
        ));
    }

    #[test]
    fn test_take_status_clears_reading() {
        let (mut camera, clock) = camera();
        settle(&mut camera, &clock);
        assert_eq!(camera.take_status().changed_blocks, Some(0));
        assert_eq!(camera.take_status().changed_blocks, None);
    }

    #[test]
    fn test_capture_failures_recover_in_cycle() {
        let (mut camera, _) = camera();
        camera.driver_mut().script_captures([true, true, true]);
        let report = camera.tick(None);
        assert!(matches!(report.cycle, CycleOutcome::Classified(_)));
        assert_eq!(camera.recovery_stats().power_cycles, 1);
        assert!(!camera.driver().restart_requested());
    }

    #[test]
    fn test_dead_sensor_is_fatal() {
        let (mut camera, _) = camera();
        camera.driver_mut().kill();
        match camera.tick(None).cycle {
            CycleOutcome::Failed(e) => assert!(e.is_fatal()),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(camera.driver().restart_requested());
    }

    #[test]
    fn test_maintenance_adjusts_exposure_and_rebaselines() {
        let (mut camera, clock) = camera_with(MockSensor::with_exposure_response);
        camera.handle_request(Request::SetExposure(600)).unwrap();
        assert_eq!(camera.driver().settings().exposure, 600);

        clock.advance(5_000);
        let report = camera.tick(None);
        assert!(matches!(
            report.maintenance,
            Some(MaintenanceOutcome::Adjusted(ExposureAdjustment::ExposureDown))
        ));
        let exposure = camera.settings().exposure().exposure;
        assert!((exposure - 575.8).abs() < 1e-3);
        assert_eq!(camera.driver().settings().exposure, 576);
        assert!(!camera.frame_store().has_uncommitted());
    }

    #[test]
    fn test_restore_defaults() {
        let (mut camera, _) = camera();
        camera.handle_request(Request::SetBlockThreshold(40)).unwrap();
        camera.handle_request(Request::DisableDetection).unwrap();
        camera.handle_request(Request::RestoreDefaults).unwrap();
        assert_eq!(camera.settings().thresholds().block_threshold, 7);
        assert_eq!(camera.detection(), DetectionState::Enabled);
    }

    #[test]
    fn test_persisted_round_trip() {
        let (mut original, _) = camera();
        original.handle_request(Request::SetTriggerLimit(45)).unwrap();
        original.handle_request(Request::DisableDetection).unwrap();
        let text = original.persisted();

        let (mut restored, _) = camera();
        let report = restored.load_persisted(&text);
        assert!(report.is_clean());
        assert_eq!(restored.settings().thresholds().trigger_limit_secs, 45);
        assert_eq!(restored.detection(), DetectionState::Disabled);
    }
}
