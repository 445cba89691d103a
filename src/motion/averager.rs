//! Downsampling of sensor frames into block averages.

use crate::capture::{CameraDriver, CameraError, PixelFormat, SensorFrame};
use crate::config::GridGeometry;

use super::grid::BlockGrid;

/// Reduces grayscale frames to a grid of `block_size × block_size` averages.
#[derive(Debug, Clone)]
pub struct BlockAverager {
    frame_width: u32,
    frame_height: u32,
    block_size: u32,
}

impl BlockAverager {
    /// `geometry` must have passed [`GridGeometry::validate`].
    pub fn new(geometry: &GridGeometry) -> Self {
        debug_assert!(geometry.validate().is_ok(), "unvalidated grid geometry");
        Self {
            frame_width: geometry.frame_width,
            frame_height: geometry.frame_height,
            block_size: geometry.block_size,
        }
    }

    /// Captures one frame from `driver` and reduces it into `grid`.
    ///
    /// Returns the overall average brightness (mean of block values).
    pub fn capture<D: CameraDriver + ?Sized>(
        &self,
        driver: &mut D,
        grid: &mut BlockGrid,
    ) -> Result<u8, CameraError> {
        let frame = driver.capture()?;
        self.reduce(&frame, grid)
    }

    /// Reduces an already captured frame into `grid`.
    pub fn reduce(&self, frame: &SensorFrame, grid: &mut BlockGrid) -> Result<u8, CameraError> {
        if frame.format() != PixelFormat::Grayscale {
            return Err(CameraError::UnexpectedFrame(format!(
                "expected grayscale, got {}",
                frame.format()
            )));
        }
        if frame.width() != self.frame_width
            || frame.height() != self.frame_height
            || !frame.is_valid()
        {
            return Err(CameraError::UnexpectedFrame(format!(
                "expected {}x{}, got {:?}",
                self.frame_width, self.frame_height, frame
            )));
        }

        let bs = self.block_size as usize;
        let width = self.frame_width as usize;
        let area = (bs * bs) as u32;
        let columns = usize::from(grid.columns());
        let pixels = frame.data();

        for (i, cell) in grid.cells_mut().iter_mut().enumerate() {
            let x0 = (i % columns) * bs;
            let y0 = (i / columns) * bs;
            let mut sum: u32 = 0;
            for row in pixels[y0 * width..(y0 + bs) * width].chunks_exact(width) {
                sum += row[x0..x0 + bs].iter().map(|&p| u32::from(p)).sum::<u32>();
            }
            *cell = (sum / area) as u8;
        }

        Ok(grid.average())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry {
            frame_width: 40,
            frame_height: 20,
            block_size: 10,
            mask_columns: 2,
            mask_rows: 1,
        }
    }

    #[test]
    fn test_reduce_uniform_frame() {
        let g = geometry();
        let averager = BlockAverager::new(&g);
        let mut grid = BlockGrid::new(g.block_columns(), g.block_rows());
        let frame = SensorFrame::grayscale(vec![90; 800], 40, 20, 1);

        let brightness = averager.reduce(&frame, &mut grid).unwrap();
        assert_eq!(brightness, 90);
        assert!(grid.cells().iter().all(|&v| v == 90));
    }

    #[test]
    fn test_reduce_isolates_blocks() {
        let g = geometry();
        let averager = BlockAverager::new(&g);
        let mut grid = BlockGrid::new(4, 2);
        let mut pixels = vec![0u8; 800];
        // Fill block (2, 1) with 200.
        for y in 10..20 {
            for x in 20..30 {
                pixels[y * 40 + x] = 200;
            }
        }
        let frame = SensorFrame::grayscale(pixels, 40, 20, 1);

        let brightness = averager.reduce(&frame, &mut grid).unwrap();
        assert_eq!(grid.get(2, 1), 200);
        assert_eq!(grid.get(1, 1), 0);
        assert_eq!(brightness, 25);
    }

    #[test]
    fn test_reduce_rejects_jpeg() {
        let g = geometry();
        let averager = BlockAverager::new(&g);
        let mut grid = BlockGrid::new(4, 2);
        let frame = SensorFrame::new(vec![0; 800], 40, 20, PixelFormat::Jpeg, 1);
        assert!(matches!(
            averager.reduce(&frame, &mut grid),
            Err(CameraError::UnexpectedFrame(_))
        ));
    }
}
