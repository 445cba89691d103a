//! Camera driver abstraction.
//!
//! The detection core never talks to sensor hardware directly. Every
//! operation goes through [`CameraDriver`], which the firmware implements
//! over the vendor driver and tests implement with [`MockSensor`].

use std::collections::VecDeque;

use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use thiserror::Error;

use super::config::{CaptureConfig, SensorSettings};
use super::frame::{PixelFormat, SensorFrame};

/// Errors reported by a camera driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("sensor returned no frame buffer")]
    CaptureFailed,
    #[error("driver initialisation in {0} mode failed")]
    InitFailed(PixelFormat),
    #[error("camera not initialized")]
    NotInitialized,
    #[error("failed to apply sensor settings: {0}")]
    SettingsRejected(String),
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),
}

/// Trait for sensor driver implementations.
pub trait CameraDriver {
    /// Initialises the driver in `format`. The driver must be deinitialised first.
    fn init(&mut self, format: PixelFormat) -> Result<(), CameraError>;

    /// Tears down the driver, releasing frame buffers.
    fn deinit(&mut self);

    /// Captures one frame in the current format.
    fn capture(&mut self) -> Result<SensorFrame, CameraError>;

    /// Pushes exposure, gain and orientation to the sensor.
    fn apply_settings(&mut self, settings: &SensorSettings) -> Result<(), CameraError>;

    /// Drives the sensor power-down line. `false` cuts power.
    fn set_powered(&mut self, on: bool);

    /// Switches the illumination LED.
    fn set_illuminator(&mut self, on: bool);

    /// Requests a full device restart. Real hardware does not return.
    fn restart_device(&mut self);

    /// Format the driver is currently initialised in, if any.
    fn current_format(&self) -> Option<PixelFormat>;
}

/// Deterministic simulated sensor.
///
/// Renders a luminance scene with seeded noise, responds to exposure and
/// gain, and can be scripted to fail captures or initialisations so that
/// recovery paths can be exercised.
#[derive(Debug)]
pub struct MockSensor {
    config: CaptureConfig,
    format: Option<PixelFormat>,
    powered: bool,
    illuminator: bool,
    sequence: u64,
    rng: ChaCha8Rng,
    /// Scene luminance, one byte per motion-frame pixel.
    scene: Vec<u8>,
    noise: u8,
    exposure_response: bool,
    settings: SensorSettings,
    capture_faults: VecDeque<bool>,
    init_faults: VecDeque<bool>,
    dead: bool,
    restart_requested: bool,
    stats: MockStats,
}

/// Call counters recorded by [`MockSensor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub captures: u32,
    pub inits: u32,
    pub deinits: u32,
    pub power_cycles: u32,
    pub settings_applied: u32,
}

impl MockStats {
    /// Number of calls that touched the sensor.
    pub fn accesses(&self) -> u32 {
        self.captures + self.inits + self.deinits + self.settings_applied
    }
}

impl MockSensor {
    /// Creates a sensor showing a uniform scene of `level`.
    pub fn new(config: CaptureConfig, level: u8) -> Self {
        let pixels = (config.frame_width * config.frame_height) as usize;
        Self {
            config,
            format: None,
            powered: true,
            illuminator: false,
            sequence: 0,
            rng: ChaCha8Rng::seed_from_u64(0x6d6f_7469_6f6e),
            scene: vec![level; pixels],
            noise: 0,
            exposure_response: false,
            settings: SensorSettings::default(),
            capture_faults: VecDeque::new(),
            init_faults: VecDeque::new(),
            dead: false,
            restart_requested: false,
            stats: MockStats::default(),
        }
    }

    /// Adds uniform noise of `±amplitude` to every pixel.
    pub fn with_noise(mut self, amplitude: u8, seed: u64) -> Self {
        self.noise = amplitude;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Scales rendered luminance with exposure and gain.
    pub fn with_exposure_response(mut self) -> Self {
        self.exposure_response = true;
        self
    }

    /// Replaces the whole scene. Length must match the motion frame.
    pub fn set_scene(&mut self, scene: Vec<u8>) {
        debug_assert_eq!(scene.len(), self.scene.len());
        self.scene = scene;
    }

    pub fn fill_scene(&mut self, level: u8) {
        self.scene.iter_mut().for_each(|p| *p = level);
    }

    /// Paints a rectangle of the scene with `level`.
    pub fn paint_rect(&mut self, x: u32, y: u32, w: u32, h: u32, level: u8) {
        let width = self.config.frame_width;
        let height = self.config.frame_height;
        for row in y..(y + h).min(height) {
            for col in x..(x + w).min(width) {
                self.scene[(row * width + col) as usize] = level;
            }
        }
    }

    /// Queues outcomes for upcoming captures: `true` fails that capture.
    pub fn script_captures(&mut self, failures: impl IntoIterator<Item = bool>) {
        self.capture_faults.extend(failures);
    }

    /// Queues outcomes for upcoming initialisations: `true` fails it.
    pub fn script_inits(&mut self, failures: impl IntoIterator<Item = bool>) {
        self.init_faults.extend(failures);
    }

    /// Makes every capture fail until the device restarts.
    pub fn kill(&mut self) {
        self.dead = true;
    }

    pub fn stats(&self) -> MockStats {
        self.stats
    }

    pub fn settings(&self) -> SensorSettings {
        self.settings
    }

    pub fn illuminator(&self) -> bool {
        self.illuminator
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    fn render_grayscale(&mut self) -> Vec<u8> {
        let scale = if self.exposure_response {
            // Unit response at exposure 300 and no gain.
            (f32::from(self.settings.exposure) / 300.0) * (1.0 + f32::from(self.settings.gain) / 10.0)
        } else {
            1.0
        };
        let noise = i32::from(self.noise);
        let span = (2 * noise + 1) as u32;
        let mut pixels = Vec::with_capacity(self.scene.len());
        for i in 0..self.scene.len() {
            let base = (f32::from(self.scene[i]) * scale).round() as i32;
            let jitter = if noise > 0 {
                (self.rng.next_u32() % span) as i32 - noise
            } else {
                0
            };
            pixels.push((base + jitter).clamp(0, 255) as u8);
        }
        pixels
    }

    fn render_jpeg(&mut self) -> Vec<u8> {
        let body = (self.config.jpeg_width * self.config.jpeg_height / 20) as usize;
        let mut data = Vec::with_capacity(body + 4);
        data.extend_from_slice(&[0xFF, 0xD8]);
        data.extend((0..body).map(|_| (self.rng.next_u32() & 0xFE) as u8));
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }
}

impl CameraDriver for MockSensor {
    fn init(&mut self, format: PixelFormat) -> Result<(), CameraError> {
        self.stats.inits += 1;
        if !self.powered || self.init_faults.pop_front().unwrap_or(false) {
            tracing::debug!(%format, "MockSensor init failed");
            return Err(CameraError::InitFailed(format));
        }
        self.format = Some(format);
        tracing::trace!(%format, "MockSensor initialised");
        Ok(())
    }

    fn deinit(&mut self) {
        self.stats.deinits += 1;
        self.format = None;
    }

    fn capture(&mut self) -> Result<SensorFrame, CameraError> {
        self.stats.captures += 1;
        let format = self.format.ok_or(CameraError::NotInitialized)?;
        if self.dead || self.capture_faults.pop_front().unwrap_or(false) {
            return Err(CameraError::CaptureFailed);
        }
        self.sequence += 1;
        let frame = match format {
            PixelFormat::Grayscale => {
                let pixels = self.render_grayscale();
                SensorFrame::grayscale(
                    pixels,
                    self.config.frame_width,
                    self.config.frame_height,
                    self.sequence,
                )
            }
            PixelFormat::Jpeg => {
                let data = self.render_jpeg();
                SensorFrame::new(
                    data,
                    self.config.jpeg_width,
                    self.config.jpeg_height,
                    PixelFormat::Jpeg,
                    self.sequence,
                )
            }
        };
        Ok(frame)
    }

    fn apply_settings(&mut self, settings: &SensorSettings) -> Result<(), CameraError> {
        self.stats.settings_applied += 1;
        if self.format.is_none() {
            return Err(CameraError::NotInitialized);
        }
        self.settings = *settings;
        Ok(())
    }

    fn set_powered(&mut self, on: bool) {
        if !on {
            self.stats.power_cycles += 1;
            self.format = None;
        }
        self.powered = on;
    }

    fn set_illuminator(&mut self, on: bool) {
        self.illuminator = on;
    }

    fn restart_device(&mut self) {
        tracing::warn!("MockSensor device restart requested");
        self.restart_requested = true;
        self.dead = false;
        self.format = None;
    }

    fn current_format(&self) -> Option<PixelFormat> {
        self.format
    }
}
