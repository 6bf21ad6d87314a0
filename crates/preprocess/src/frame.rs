use thiserror::Error;

/// Channel order of an interleaved 3-channel 8-bit frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    /// OpenCV order, what the body/head/hand export was trained on.
    #[default]
    Bgr,
    Rgb,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has zero area ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Buffer size mismatch: expected {expected} bytes for {width}x{height}x3, got {actual}")]
    BufferSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Read-only view over an HWC frame. Origin is top-left.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    format: ColorFormat,
}

impl<'a> FrameView<'a> {
    pub fn new(
        pixels: &'a [u8],
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyFrame { width, height });
        }

        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(FrameError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            pixels,
            width,
            height,
            format,
        })
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test a correctly sized buffer is accepted
    #[test]
    fn test_valid_frame() {
        let pixels = vec![0u8; 4 * 2 * 3];
        let frame = FrameView::new(&pixels, 4, 2, ColorFormat::Rgb).unwrap();

        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.format(), ColorFormat::Rgb);
        assert_eq!(frame.pixels().len(), 24);
    }

    /// Test buffer size mismatch detection
    #[test]
    fn test_buffer_size_mismatch_detection() {
        let pixels = vec![0u8; 200]; // Wrong size for 10x10

        let err = FrameView::new(&pixels, 10, 10, ColorFormat::Bgr).unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferSizeMismatch {
                width: 10,
                height: 10,
                expected: 300,
                actual: 200,
            }
        );
        assert!(
            err.to_string().contains("mismatch"),
            "Error should mention mismatch"
        );
    }

    /// Test zero-area frames are rejected
    #[test]
    fn test_empty_frame_rejected() {
        let err = FrameView::new(&[], 0, 10, ColorFormat::Bgr).unwrap_err();
        assert_eq!(err, FrameError::EmptyFrame { width: 0, height: 10 });
    }
}
