//! Detection mask.
//!
//! The mask is a coarse grid of cells; each cell enables or disables a
//! fixed `unit_columns × unit_rows` group of blocks.

use crate::config::GridGeometry;

/// `columns × rows` grid of enable flags over groups of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskGrid {
    columns: u16,
    rows: u16,
    unit_columns: u16,
    unit_rows: u16,
    cells: Vec<bool>,
}

impl MaskGrid {
    /// Creates a fully active mask for a validated `geometry`.
    pub fn all_active(geometry: &GridGeometry) -> Self {
        debug_assert!(geometry.validate().is_ok(), "unvalidated grid geometry");
        Self {
            columns: geometry.mask_columns,
            rows: geometry.mask_rows,
            unit_columns: geometry.unit_columns(),
            unit_rows: geometry.unit_rows(),
            cells: vec![true; usize::from(geometry.mask_columns) * usize::from(geometry.mask_rows)],
        }
    }

    #[inline]
    pub fn columns(&self) -> u16 {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Number of blocks each mask cell covers.
    #[inline]
    pub fn blocks_per_unit(&self) -> u16 {
        self.unit_columns * self.unit_rows
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the flag for cell `(column, row)`, or `None` if out of range.
    pub fn cell(&self, column: u16, row: u16) -> Option<bool> {
        self.index(column, row).map(|i| self.cells[i])
    }

    /// Sets a cell. Returns `Some(changed)` or `None` if out of range.
    pub fn set_cell(&mut self, column: u16, row: u16, active: bool) -> Option<bool> {
        let i = self.index(column, row)?;
        let changed = self.cells[i] != active;
        self.cells[i] = active;
        Some(changed)
    }

    /// Row-major cell flags.
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Replaces all cells. Returns `Some(changed)` or `None` on length mismatch.
    pub fn replace(&mut self, cells: &[bool]) -> Option<bool> {
        if cells.len() != self.cells.len() {
            return None;
        }
        let changed = self.cells.as_slice() != cells;
        self.cells.copy_from_slice(cells);
        Some(changed)
    }

    pub fn active_cells(&self) -> u16 {
        self.cells.iter().filter(|&&c| c).count() as u16
    }

    /// Maximum possible changed-block count under this mask.
    pub fn capacity(&self) -> u16 {
        self.active_cells() * self.blocks_per_unit()
    }

    /// True if block `(column, row)` lies inside an active cell.
    #[inline]
    pub fn block_active(&self, block_column: u16, block_row: u16) -> bool {
        self.cell(block_column / self.unit_columns, block_row / self.unit_rows)
            .unwrap_or(false)
    }

    fn index(&self, column: u16, row: u16) -> Option<usize> {
        (column < self.columns && row < self.rows)
            .then(|| usize::from(row) * usize::from(self.columns) + usize::from(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::default()
    }

    #[test]
    fn test_default_capacity() {
        let mask = MaskGrid::all_active(&geometry());
        assert_eq!(mask.cell_count(), 12);
        assert_eq!(mask.blocks_per_unit(), 16);
        assert_eq!(mask.capacity(), 192);
    }

    #[test]
    fn test_set_cell_reports_change() {
        let mut mask = MaskGrid::all_active(&geometry());
        assert_eq!(mask.set_cell(1, 1, false), Some(true));
        assert_eq!(mask.set_cell(1, 1, false), Some(false));
        assert_eq!(mask.set_cell(9, 0, false), None);
        assert_eq!(mask.capacity(), 176);
    }

    #[test]
    fn test_block_active_maps_to_cell() {
        let mut mask = MaskGrid::all_active(&geometry());
        mask.set_cell(0, 0, false);
        assert!(!mask.block_active(0, 0));
        assert!(!mask.block_active(3, 3));
        assert!(mask.block_active(4, 0));
        assert!(mask.block_active(0, 4));
    }
}
