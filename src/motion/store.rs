//! Current/previous block grid ownership.

use crate::camera::DetectionState;
use crate::capture::{CameraDriver, CameraError};
use crate::config::GridGeometry;

use super::averager::BlockAverager;
use super::grid::BlockGrid;

/// Owns the `current` and `previous` block grids.
///
/// Only [`FrameStore::capture_frame`] writes `current`; only a commit
/// copies `current` into `previous`.
#[derive(Debug, Clone)]
pub struct FrameStore {
    averager: BlockAverager,
    current: BlockGrid,
    previous: BlockGrid,
    brightness: u8,
    /// A capture happened since the last commit.
    uncommitted: bool,
    captures: u64,
}

impl FrameStore {
    pub fn new(geometry: &GridGeometry) -> Self {
        let (columns, rows) = (geometry.block_columns(), geometry.block_rows());
        Self {
            averager: BlockAverager::new(geometry),
            current: BlockGrid::new(columns, rows),
            previous: BlockGrid::new(columns, rows),
            brightness: 0,
            uncommitted: false,
            captures: 0,
        }
    }

    /// Captures a grayscale frame into `current` and updates brightness.
    ///
    /// On failure `current` and brightness are left as they were.
    pub fn capture_frame<D: CameraDriver + ?Sized>(&mut self, driver: &mut D) -> Result<u8, CameraError> {
        let mut scratch = self.current.clone();
        let brightness = self.averager.capture(driver, &mut scratch)?;
        self.current = scratch;
        self.brightness = brightness;
        self.uncommitted = true;
        self.captures += 1;
        tracing::trace!(captures = self.captures, brightness, "Frame captured");
        Ok(brightness)
    }

    /// Copies `current` into `previous` unless detection is disabled.
    ///
    /// Returns true if `previous` was updated. A second commit without an
    /// intervening capture is a no-op.
    pub fn commit_frame(&mut self, detection: DetectionState) -> bool {
        if detection == DetectionState::Disabled {
            tracing::trace!("Commit skipped while detection disabled");
            return false;
        }
        self.refresh_baseline()
    }

    /// Commits regardless of detection state.
    pub fn refresh_baseline(&mut self) -> bool {
        if !self.uncommitted {
            return false;
        }
        self.previous.copy_from(&self.current);
        self.uncommitted = false;
        true
    }

    pub fn current(&self) -> &BlockGrid {
        &self.current
    }

    pub fn previous(&self) -> &BlockGrid {
        &self.previous
    }

    /// Average brightness of the latest capture.
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn total_captures(&self) -> u64 {
        self.captures
    }

    pub fn has_uncommitted(&self) -> bool {
        self.uncommitted
    }
}
