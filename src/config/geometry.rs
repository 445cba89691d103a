//! Frame, block and mask grid dimensions.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Dimensions shared by the averager, frame store and mask.
///
/// The motion frame is divided into `block_size × block_size` pixel
/// blocks; the block grid is in turn divided into `mask_columns ×
/// mask_rows` mask cells of equal size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    /// Motion frame width in pixels.
    pub frame_width: u32,
    /// Motion frame height in pixels.
    pub frame_height: u32,
    /// Edge length of a square block in pixels.
    pub block_size: u32,
    /// Mask cells across.
    pub mask_columns: u16,
    /// Mask cells down.
    pub mask_rows: u16,
}

impl Default for GridGeometry {
    fn default() -> Self {
        // 160x120 → 16x12 blocks → 4x3 mask of 4x4-block cells.
        Self {
            frame_width: 160,
            frame_height: 120,
            block_size: 10,
            mask_columns: 4,
            mask_rows: 3,
        }
    }
}

impl GridGeometry {
    #[inline]
    pub fn block_columns(&self) -> u16 {
        (self.frame_width / self.block_size.max(1)) as u16
    }

    #[inline]
    pub fn block_rows(&self) -> u16 {
        (self.frame_height / self.block_size.max(1)) as u16
    }

    /// Blocks across one mask cell.
    #[inline]
    pub fn unit_columns(&self) -> u16 {
        self.block_columns() / self.mask_columns.max(1)
    }

    /// Blocks down one mask cell.
    #[inline]
    pub fn unit_rows(&self) -> u16 {
        self.block_rows() / self.mask_rows.max(1)
    }

    pub fn blocks_per_mask_unit(&self) -> u16 {
        self.unit_columns() * self.unit_rows()
    }

    pub fn total_blocks(&self) -> u16 {
        self.block_columns() * self.block_rows()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 || self.block_size == 0 {
            return Err(ConfigError::InvalidGeometry("zero dimension".into()));
        }
        if self.frame_width % self.block_size != 0 || self.frame_height % self.block_size != 0 {
            return Err(ConfigError::InvalidGeometry(format!(
                "{}x{} frame is not a multiple of block size {}",
                self.frame_width, self.frame_height, self.block_size
            )));
        }
        if self.mask_columns == 0 || self.mask_rows == 0 {
            return Err(ConfigError::InvalidGeometry("empty mask".into()));
        }
        if self.block_columns() % self.mask_columns != 0 || self.block_rows() % self.mask_rows != 0 {
            return Err(ConfigError::InvalidGeometry(format!(
                "{}x{} blocks are not a multiple of the {}x{} mask",
                self.block_columns(),
                self.block_rows(),
                self.mask_columns,
                self.mask_rows
            )));
        }
        // Changed-block counts are carried as u16.
        if u32::from(self.block_columns()) * u32::from(self.block_rows()) > u32::from(u16::MAX) {
            return Err(ConfigError::InvalidGeometry("too many blocks".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let g = GridGeometry::default();
        assert!(g.validate().is_ok());
        assert_eq!((g.block_columns(), g.block_rows()), (16, 12));
        assert_eq!(g.blocks_per_mask_unit(), 16);
        assert_eq!(g.total_blocks(), 192);
    }

    #[test]
    fn test_mask_must_divide_blocks() {
        let g = GridGeometry {
            mask_columns: 5,
            ..GridGeometry::default()
        };
        assert!(matches!(g.validate(), Err(ConfigError::InvalidGeometry(_))));
    }

    #[test]
    fn test_block_must_divide_frame() {
        let g = GridGeometry {
            block_size: 7,
            ..GridGeometry::default()
        };
        assert!(g.validate().is_err());
    }
}
