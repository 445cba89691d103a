//! Inbound requests and outbound collaborator hooks.

use crate::capture::SensorFrame;
use crate::config::FlashMode;
use crate::trigger::TriggerEvent;

/// Receives JPEG frames for a live stream.
pub trait StreamSink {
    /// False once the client has gone away.
    fn is_connected(&self) -> bool;

    /// Delivers one frame. Returns false if the client could not take it.
    fn send_frame(&mut self, frame: &SensorFrame) -> bool;
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReason {
    Motion,
    OnDemand,
}

/// A stored snapshot handed to storage and transport collaborators.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Slot in the rotating image store (1-based).
    pub index: u8,
    pub reason: CaptureReason,
    /// Grayscale frame grabbed just before the mode switch.
    pub preview: Option<SensorFrame>,
    pub jpeg: SensorFrame,
}

/// Collaborators notified of device events.
///
/// Every method has an empty default so sinks implement only what they use.
pub trait EventSink {
    /// A confirmed motion trigger.
    fn on_trigger(&mut self, _event: &TriggerEvent) {}

    /// A trigger that passed the notification limiter.
    fn on_notify(&mut self, _event: &TriggerEvent, _image_ok: bool) {}

    /// A stored snapshot.
    fn on_image(&mut self, _image: &CapturedImage) {}

    /// The external sensor input changed level.
    fn on_sensor_input(&mut self, _level: bool) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub triggers: Vec<TriggerEvent>,
    pub notifications: Vec<(TriggerEvent, bool)>,
    pub images: Vec<CapturedImage>,
    pub sensor_inputs: Vec<bool>,
}

impl EventSink for RecordingSink {
    fn on_trigger(&mut self, event: &TriggerEvent) {
        self.triggers.push(event.clone());
    }

    fn on_notify(&mut self, event: &TriggerEvent, image_ok: bool) {
        self.notifications.push((event.clone(), image_ok));
    }

    fn on_image(&mut self, image: &CapturedImage) {
        self.images.push(image.clone());
    }

    fn on_sensor_input(&mut self, level: bool) {
        self.sensor_inputs.push(level);
    }
}

/// One inbound request, serviced at the start of a tick.
pub enum Request {
    EnableDetection,
    DisableDetection,
    /// Forces `previous` to a fresh frame.
    RefreshBaseline,
    ToggleMaskCell { column: u16, row: u16 },
    SetBlockThreshold(u32),
    SetImageThresholdLow(u32),
    SetImageThresholdHigh(u32),
    SetConsecutiveRequired(u32),
    SetTriggerLimit(u32),
    SetNotifyLimit(u32),
    SetTargetBrightness(u32),
    SetExposure(u32),
    SetGain(u32),
    SetInvert(bool),
    SetFlash { enabled: bool, mode: FlashMode },
    SetIoRequiredHigh(bool),
    ToggleNotify,
    ToggleIlluminator,
    RestoreDefaults,
    /// Stores a JPEG snapshot.
    Snapshot,
    /// Returns the current grayscale motion frame.
    LiveFrame,
    StartStream(Box<dyn StreamSink>),
    /// Level reported by the external sensor input.
    SensorInput(bool),
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnableDetection => "enable detection",
            Self::DisableDetection => "disable detection",
            Self::RefreshBaseline => "refresh baseline",
            Self::ToggleMaskCell { .. } => "toggle mask cell",
            Self::SetBlockThreshold(_) => "set block threshold",
            Self::SetImageThresholdLow(_) => "set image threshold low",
            Self::SetImageThresholdHigh(_) => "set image threshold high",
            Self::SetConsecutiveRequired(_) => "set consecutive required",
            Self::SetTriggerLimit(_) => "set trigger limit",
            Self::SetNotifyLimit(_) => "set notify limit",
            Self::SetTargetBrightness(_) => "set target brightness",
            Self::SetExposure(_) => "set exposure",
            Self::SetGain(_) => "set gain",
            Self::SetInvert(_) => "set invert",
            Self::SetFlash { .. } => "set flash",
            Self::SetIoRequiredHigh(_) => "set io required high",
            Self::ToggleNotify => "toggle notify",
            Self::ToggleIlluminator => "toggle illuminator",
            Self::RestoreDefaults => "restore defaults",
            Self::Snapshot => "snapshot",
            Self::LiveFrame => "live frame",
            Self::StartStream(_) => "start stream",
            Self::SensorInput(_) => "sensor input",
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successfully serviced request.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Applied,
    ImageStored { index: u8 },
    LiveFrame(SensorFrame),
    StreamStarted,
}
