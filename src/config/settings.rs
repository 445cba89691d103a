//! Runtime detection settings.
//!
//! Every value the detection cycle reads lives in [`DetectionSettings`],
//! and every mutation goes through a validated setter. A rejected value
//! is logged and the previous value is kept.

use crate::exposure::ExposureState;
use crate::motion::MaskGrid;

use super::geometry::GridGeometry;
use super::ConfigError;

/// Number of snapshot slots the stored-image index cycles through.
pub const MAX_STORED_IMAGES: u8 = 6;

/// Detection and rate-limit thresholds read by the detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Per-block luminance delta that counts as changed (1-255).
    pub block_threshold: u8,
    /// Lower bound of the candidate band (changed blocks).
    pub image_threshold_low: u16,
    /// Upper bound of the candidate band (changed blocks).
    pub image_threshold_high: u16,
    /// Candidate frames in a row required to fire.
    pub consecutive_required: u8,
    /// Minimum seconds between trigger actions.
    pub trigger_limit_secs: u16,
    /// Minimum seconds between notifications.
    pub notify_limit_secs: u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            block_threshold: 7,
            image_threshold_low: 15,
            image_threshold_high: 192,
            consecutive_required: 1,
            trigger_limit_secs: 20,
            notify_limit_secs: 600,
        }
    }
}

/// When the illumination LED fires during a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashMode {
    /// Only when gain is raised, i.e. the scene is dark.
    WhenDark,
    /// For every snapshot.
    #[default]
    Always,
    /// Light up after the capture, as a visible indicator only.
    AfterCapture,
}

/// Owned configuration shared by the detection cycle and request handlers.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    geometry: GridGeometry,
    thresholds: Thresholds,
    mask: MaskGrid,
    exposure: ExposureState,
    notify_enabled: bool,
    use_flash: bool,
    flash_mode: FlashMode,
    ftp_enabled: bool,
    post_enabled: bool,
    invert: bool,
    io_required_high: bool,
    data_refresh_secs: u16,
    image_index: u8,
}

pub(crate) fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<u32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        let err = ConfigError::InvalidConfiguration {
            field,
            value,
            min,
            max,
        };
        tracing::warn!(error = %err, "Rejected configuration value");
        Err(err)
    }
}

impl DetectionSettings {
    /// Factory defaults for `geometry`.
    pub fn defaults(geometry: &GridGeometry) -> Self {
        let mask = MaskGrid::all_active(geometry);
        let thresholds = Thresholds {
            image_threshold_high: mask.capacity(),
            image_threshold_low: Thresholds::default().image_threshold_low.min(mask.capacity()),
            ..Thresholds::default()
        };
        Self {
            geometry: geometry.clone(),
            thresholds,
            mask,
            exposure: ExposureState::default(),
            notify_enabled: false,
            use_flash: false,
            flash_mode: FlashMode::default(),
            ftp_enabled: false,
            post_enabled: false,
            invert: false,
            io_required_high: false,
            data_refresh_secs: 5,
            image_index: 0,
        }
    }

    /// Resets everything except the stored-image index to factory defaults.
    pub fn restore_defaults(&mut self) {
        let image_index = self.image_index;
        *self = Self::defaults(&self.geometry);
        self.image_index = image_index;
        tracing::info!("Settings restored to defaults");
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn mask(&self) -> &MaskGrid {
        &self.mask
    }

    pub fn exposure(&self) -> ExposureState {
        self.exposure
    }

    /// Maximum possible changed-block count under the current mask.
    pub fn capacity(&self) -> u16 {
        self.mask.capacity()
    }

    pub fn set_block_threshold(&mut self, value: u32) -> Result<(), ConfigError> {
        self.thresholds.block_threshold = check_range("block threshold", value, 1, 255)? as u8;
        Ok(())
    }

    pub fn set_image_threshold_low(&mut self, value: u32) -> Result<(), ConfigError> {
        let cap = u32::from(self.capacity());
        self.thresholds.image_threshold_low = check_range("image threshold low", value, 0, cap)? as u16;
        Ok(())
    }

    pub fn set_image_threshold_high(&mut self, value: u32) -> Result<(), ConfigError> {
        let cap = u32::from(self.capacity());
        self.thresholds.image_threshold_high = check_range("image threshold high", value, 1, cap)? as u16;
        Ok(())
    }

    pub fn set_consecutive_required(&mut self, value: u32) -> Result<(), ConfigError> {
        self.thresholds.consecutive_required = check_range("consecutive detections", value, 1, 100)? as u8;
        Ok(())
    }

    pub fn set_trigger_limit_secs(&mut self, value: u32) -> Result<(), ConfigError> {
        self.thresholds.trigger_limit_secs = check_range("trigger limit time", value, 1, 3600)? as u16;
        Ok(())
    }

    pub fn set_notify_limit_secs(&mut self, value: u32) -> Result<(), ConfigError> {
        self.thresholds.notify_limit_secs = check_range("email limit time", value, 60, 10_000)? as u16;
        Ok(())
    }

    pub fn set_target_brightness(&mut self, value: u32) -> Result<(), ConfigError> {
        self.exposure.target_brightness = check_range("target brightness", value, 0, 255)? as u8;
        Ok(())
    }

    pub fn set_exposure(&mut self, value: u32) -> Result<(), ConfigError> {
        self.exposure.exposure = check_range("exposure", value, 0, 1200)? as f32;
        Ok(())
    }

    pub fn set_gain(&mut self, value: u32) -> Result<(), ConfigError> {
        self.exposure.gain = check_range("gain", value, 0, 30)? as f32;
        Ok(())
    }

    /// Stores controller output. Values are clamped, never rejected.
    pub fn store_exposure(&mut self, state: ExposureState) {
        self.exposure = state.clamped();
    }

    pub fn set_data_refresh_secs(&mut self, value: u32) -> Result<(), ConfigError> {
        self.data_refresh_secs = check_range("data refresh", value, 1, 600)? as u16;
        Ok(())
    }

    pub fn set_image_index(&mut self, value: u32) -> Result<(), ConfigError> {
        self.image_index = check_range("image index", value, 0, u32::from(MAX_STORED_IMAGES))? as u8;
        Ok(())
    }

    /// Advances the stored-image index, cycling through `1..=MAX_STORED_IMAGES`.
    pub fn next_image_index(&mut self) -> u8 {
        self.image_index = if self.image_index >= MAX_STORED_IMAGES {
            1
        } else {
            self.image_index + 1
        };
        self.image_index
    }

    pub fn image_index(&self) -> u8 {
        self.image_index
    }

    /// Sets one mask cell. Returns true if the mask changed.
    pub fn set_mask_cell(&mut self, column: u16, row: u16, active: bool) -> Result<bool, ConfigError> {
        let changed = self
            .mask
            .set_cell(column, row, active)
            .ok_or(ConfigError::MaskCellOutOfRange { column, row })?;
        if changed {
            self.apply_mask_capacity();
        }
        Ok(changed)
    }

    /// Flips one mask cell. Returns the new state.
    pub fn toggle_mask_cell(&mut self, column: u16, row: u16) -> Result<bool, ConfigError> {
        let current = self
            .mask
            .cell(column, row)
            .ok_or(ConfigError::MaskCellOutOfRange { column, row })?;
        self.set_mask_cell(column, row, !current)?;
        Ok(!current)
    }

    /// Replaces the whole mask (row-major). Returns true if it changed.
    pub fn replace_mask(&mut self, cells: &[bool]) -> Result<bool, ConfigError> {
        let changed = self.mask.replace(cells).ok_or(ConfigError::MaskSize {
            expected: self.mask.cell_count(),
            got: cells.len(),
        })?;
        if changed {
            self.apply_mask_capacity();
        }
        Ok(changed)
    }

    /// Keeps both band limits within the capacity of the new mask.
    fn apply_mask_capacity(&mut self) {
        let cap = self.capacity();
        self.thresholds.image_threshold_high = self.thresholds.image_threshold_high.min(cap);
        self.thresholds.image_threshold_low = self.thresholds.image_threshold_low.min(cap);
        tracing::info!(
            active_cells = self.mask.active_cells(),
            capacity = cap,
            high = self.thresholds.image_threshold_high,
            "Detection mask updated"
        );
    }

    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled
    }

    pub fn set_notify_enabled(&mut self, on: bool) {
        self.notify_enabled = on;
    }

    pub fn use_flash(&self) -> bool {
        self.use_flash
    }

    pub fn set_use_flash(&mut self, on: bool) {
        self.use_flash = on;
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.flash_mode
    }

    pub fn set_flash_mode(&mut self, mode: FlashMode) {
        self.flash_mode = mode;
    }

    pub fn ftp_enabled(&self) -> bool {
        self.ftp_enabled
    }

    pub fn set_ftp_enabled(&mut self, on: bool) {
        self.ftp_enabled = on;
    }

    pub fn post_enabled(&self) -> bool {
        self.post_enabled
    }

    pub fn set_post_enabled(&mut self, on: bool) {
        self.post_enabled = on;
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    pub fn set_invert(&mut self, on: bool) {
        self.invert = on;
    }

    pub fn io_required_high(&self) -> bool {
        self.io_required_high
    }

    pub fn set_io_required_high(&mut self, on: bool) {
        self.io_required_high = on;
    }

    pub fn data_refresh_secs(&self) -> u16 {
        self.data_refresh_secs
    }
}
