//! Sensor frame type returned by camera drivers.

/// Pixel format the sensor driver is initialised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One luminance byte per pixel, used for motion detection.
    Grayscale,
    /// Compressed JPEG, used for snapshots and streams.
    Jpeg,
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grayscale => write!(f, "grayscale"),
            Self::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// A single buffer captured from the sensor.
#[derive(Clone)]
pub struct SensorFrame {
    /// Raw buffer: luminance bytes for grayscale, encoded data for JPEG.
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Monotonic sequence number assigned by the driver.
    sequence: u64,
}

impl SensorFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            sequence,
        }
    }

    /// Convenience constructor for grayscale frames.
    pub fn grayscale(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::new(pixels, width, height, PixelFormat::Grayscale, sequence)
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Grayscale frames must carry exactly one byte per pixel; JPEG
    /// buffers only need to be non-trivially sized.
    pub fn is_valid(&self) -> bool {
        match self.format {
            PixelFormat::Grayscale => self.data.len() == self.pixel_count(),
            PixelFormat::Jpeg => self.data.len() > MIN_JPEG_BYTES,
        }
    }
}

/// Anything smaller is treated as a failed JPEG capture.
pub const MIN_JPEG_BYTES: usize = 100;

impl std::fmt::Debug for SensorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_frame_valid() {
        let frame = SensorFrame::grayscale(vec![0u8; 160 * 120], 160, 120, 1);
        assert_eq!(frame.format(), PixelFormat::Grayscale);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_grayscale_frame_wrong_size() {
        let frame = SensorFrame::grayscale(vec![0u8; 100], 160, 120, 1);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_tiny_jpeg_invalid() {
        let frame = SensorFrame::new(vec![0xFF; 40], 640, 480, PixelFormat::Jpeg, 1);
        assert!(!frame.is_valid());
    }
}
