//! Block luminance grid.

/// `columns × rows` grid of per-block average luminance (0-255).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGrid {
    columns: u16,
    rows: u16,
    cells: Vec<u8>,
}

impl BlockGrid {
    /// Creates a black grid.
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            cells: vec![0; usize::from(columns) * usize::from(rows)],
        }
    }

    /// Builds a grid from row-major values.
    ///
    /// Returns `None` if `cells` does not hold exactly `columns × rows` values.
    pub fn from_cells(columns: u16, rows: u16, cells: Vec<u8>) -> Option<Self> {
        (cells.len() == usize::from(columns) * usize::from(rows)).then_some(Self {
            columns,
            rows,
            cells,
        })
    }

    #[inline]
    pub fn columns(&self) -> u16 {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> u16 {
        self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, column: u16, row: u16) -> u8 {
        self.cells[self.index(column, row)]
    }

    #[inline]
    pub fn set(&mut self, column: u16, row: u16, value: u8) {
        let idx = self.index(column, row);
        self.cells[idx] = value;
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Mean of all block values, or 0 for an empty grid.
    pub fn average(&self) -> u8 {
        if self.cells.is_empty() {
            return 0;
        }
        let sum: u64 = self.cells.iter().map(|&v| u64::from(v)).sum();
        (sum / self.cells.len() as u64) as u8
    }

    /// Copies `other` into `self`. Dimensions must match.
    pub fn copy_from(&mut self, other: &BlockGrid) {
        debug_assert_eq!((self.columns, self.rows), (other.columns, other.rows));
        self.cells.copy_from_slice(&other.cells);
    }

    #[inline]
    fn index(&self, column: u16, row: u16) -> usize {
        usize::from(row) * usize::from(self.columns) + usize::from(column)
    }
}
