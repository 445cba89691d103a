//! Flat line-per-value settings layout.
//!
//! The settings collaborator stores one value per line in a fixed order:
//!
//! ```text
//! title
//! block threshold, image threshold low, image threshold high,
//! target brightness, email enabled, trigger limit, detection enabled,
//! email limit, use flash, last image index, exposure, gain,
//! consecutive required, ftp enabled, post enabled, invert, data refresh,
//! mask flags (row-major)
//! ```
//!
//! Each value is validated on its own; a bad line is logged and skipped.

use std::fmt::Write as _;

use chrono::Local;

use crate::camera::DetectionState;

use super::settings::{check_range, DetectionSettings};
use super::ConfigError;

const TITLE: &str = "motion-cam settings file";

/// Result of applying a persisted settings file.
#[derive(Debug, Default)]
pub struct PersistedLoad {
    /// Detection state to resume with. A stored paused state resumes enabled.
    pub detection: Option<DetectionState>,
    /// Every rejected value, in file order.
    pub rejected: Vec<ConfigError>,
}

impl PersistedLoad {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn parse_flag(field: &'static str, value: u32) -> Result<bool, ConfigError> {
    check_range(field, value, 0, 1).map(|v| v == 1)
}

impl DetectionSettings {
    /// Renders the persisted layout.
    pub fn to_persisted(&self, detection: DetectionState) -> String {
        let t = self.thresholds();
        let e = self.exposure();
        let detection_flag = detection != DetectionState::Disabled;
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{TITLE} {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        for value in [
            u32::from(t.block_threshold),
            u32::from(t.image_threshold_low),
            u32::from(t.image_threshold_high),
            u32::from(e.target_brightness),
            u32::from(flag(self.notify_enabled())),
            u32::from(t.trigger_limit_secs),
            u32::from(flag(detection_flag)),
            u32::from(t.notify_limit_secs),
            u32::from(flag(self.use_flash())),
            u32::from(self.image_index()),
            e.exposure.round() as u32,
            e.gain.round() as u32,
            u32::from(t.consecutive_required),
            u32::from(flag(self.ftp_enabled())),
            u32::from(flag(self.post_enabled())),
            u32::from(flag(self.invert())),
            u32::from(self.data_refresh_secs()),
        ] {
            let _ = writeln!(out, "{value}");
        }
        for &cell in self.mask().cells() {
            let _ = writeln!(out, "{}", flag(cell));
        }
        out
    }

    /// Applies a persisted settings text on top of the current values.
    pub fn load_persisted(&mut self, text: &str) -> PersistedLoad {
        let mut report = PersistedLoad::default();
        // Skip the title line. Unparseable lines read as u32::MAX so they fail range checks.
        let values: Vec<u32> = text
            .lines()
            .skip(1)
            .map(|line| line.trim().parse::<u32>().unwrap_or(u32::MAX))
            .collect();
        let value = |i: usize| values.get(i).copied();

        // The mask goes first so the band is validated against its capacity.
        let mut cells = self.mask().cells().to_vec();
        let mut bad_mask = false;
        for (i, cell) in cells.iter_mut().enumerate() {
            match value(17 + i) {
                Some(0) => *cell = false,
                Some(1) => *cell = true,
                _ => bad_mask = true,
            }
        }
        if bad_mask {
            tracing::warn!("Invalid mask entry in settings");
            report.rejected.push(ConfigError::InvalidMaskEntry);
        }
        // Length always matches; the only error is a size mismatch.
        if let Err(e) = self.replace_mask(&cells) {
            report.rejected.push(e);
        }

        let mut apply = |result: Result<(), ConfigError>| {
            if let Err(e) = result {
                report.rejected.push(e);
            }
        };

        let fields: [(usize, fn(&mut DetectionSettings, u32) -> Result<(), ConfigError>); 11] = [
            (0, DetectionSettings::set_block_threshold),
            (1, DetectionSettings::set_image_threshold_low),
            (2, DetectionSettings::set_image_threshold_high),
            (3, DetectionSettings::set_target_brightness),
            (5, DetectionSettings::set_trigger_limit_secs),
            (7, DetectionSettings::set_notify_limit_secs),
            (9, DetectionSettings::set_image_index),
            (10, DetectionSettings::set_exposure),
            (11, DetectionSettings::set_gain),
            (12, DetectionSettings::set_consecutive_required),
            (16, DetectionSettings::set_data_refresh_secs),
        ];
        for (index, setter) in fields {
            if let Some(v) = value(index) {
                apply(setter(self, v));
            }
        }

        let flags: [(usize, &'static str, fn(&mut DetectionSettings, bool)); 5] = [
            (4, "email enabled", DetectionSettings::set_notify_enabled),
            (8, "use flash", DetectionSettings::set_use_flash),
            (13, "ftp enabled", DetectionSettings::set_ftp_enabled),
            (14, "post enabled", DetectionSettings::set_post_enabled),
            (15, "invert", DetectionSettings::set_invert),
        ];
        for (index, field, setter) in flags {
            if let Some(v) = value(index) {
                match parse_flag(field, v) {
                    Ok(on) => setter(self, on),
                    Err(e) => report.rejected.push(e),
                }
            }
        }

        if let Some(v) = value(6) {
            // 2 is the legacy "paused" value; resume detection.
            match check_range("detection enabled", v, 0, 2) {
                Ok(0) => report.detection = Some(DetectionState::Disabled),
                Ok(_) => report.detection = Some(DetectionState::Enabled),
                Err(e) => report.rejected.push(e),
            }
        }

        if report.is_clean() {
            tracing::info!("Settings loaded");
        } else {
            tracing::warn!(rejected = report.rejected.len(), "Settings loaded with rejected values");
        }
        report
    }
}
