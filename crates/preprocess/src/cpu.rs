use crate::{ColorFormat, DEFAULT_INPUT_SIZE, FrameView, Preprocess};
use common::{span, span_debug};
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::Array3;

/// Stretches frames to the model input size and lays them out as CHW f32.
///
/// Samples stay in the raw `[0, 255]` range: the exported model expects
/// unnormalized input, so no mean/std is applied.
pub struct CpuPreProcessor {
    input_size: (u32, u32),
    channel_order: ColorFormat,
    resizer: Resizer,
    resized: Image<'static>,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32), channel_order: ColorFormat) -> Self {
        Self {
            input_size,
            channel_order,
            resizer: Resizer::new(),
            resized: Image::new(input_size.0, input_size.1, PixelType::U8x3),
        }
    }

    pub fn channel_order(&self) -> ColorFormat {
        self.channel_order
    }

    /// Bilinear stretch to exactly `input_size`; aspect ratio is not kept.
    fn resize(&mut self, frame: &FrameView<'_>) -> anyhow::Result<()> {
        let _s = span_debug!("resize");

        let src = ImageRef::new(
            frame.width(),
            frame.height(),
            frame.pixels(),
            PixelType::U8x3,
        )?;

        self.resizer.resize(
            &src,
            &mut self.resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Interpolation(FilterType::Bilinear)),
        )?;

        Ok(())
    }

    /// HWC u8 -> CHW f32, swapping R and B when the frame order differs from
    /// the model's.
    fn to_chw(
        pixels: &[u8],
        width: usize,
        height: usize,
        swap_rb: bool,
    ) -> anyhow::Result<Array3<f32>> {
        let _s = span_debug!("to_chw");

        let spatial = width * height;
        let mut output = vec![0.0f32; 3 * spatial];
        let (first, last) = if swap_rb { (2, 0) } else { (0, 2) };

        for (i, px) in pixels.chunks_exact(3).enumerate() {
            output[i] = px[first] as f32;
            output[i + spatial] = px[1] as f32;
            output[i + 2 * spatial] = px[last] as f32;
        }

        Ok(Array3::from_shape_vec((3, height, width), output)?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, ColorFormat::default())
    }
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(&mut self, frame: &FrameView<'_>) -> anyhow::Result<Array3<f32>> {
        let _s = span!("preprocess_frame");

        tracing::trace!(
            width = frame.width(),
            height = frame.height(),
            format = ?frame.format(),
            "Preprocessing frame dimensions"
        );

        let (width, height) = self.input_size;
        let swap_rb = frame.format() != self.channel_order;

        if (frame.width(), frame.height()) == self.input_size {
            return Self::to_chw(frame.pixels(), width as usize, height as usize, swap_rb);
        }

        self.resize(frame)?;
        Self::to_chw(
            self.resized.buffer(),
            width as usize,
            height as usize,
            swap_rb,
        )
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: u32, height: u32, px: [u8; 3]) -> Vec<u8> {
        px.iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect()
    }

    fn assert_close(actual: f32, expected: f32, what: &str) {
        assert!(
            (actual - expected).abs() <= 1.0,
            "{} should be ~{} (got {})",
            what,
            expected,
            actual
        );
    }

    /// Test output is CHW at the model size
    #[test]
    fn test_output_shape_matches_input_size() {
        let pixels = uniform_frame(640, 480, [128, 128, 128]);
        let frame = FrameView::new(&pixels, 640, 480, ColorFormat::Bgr).unwrap();

        let mut preprocessor = CpuPreProcessor::new((320, 256), ColorFormat::Bgr);
        let output = preprocessor.preprocess(&frame).unwrap();

        assert_eq!(output.shape(), &[3, 256, 320]);
        assert_eq!(preprocessor.input_size(), (320, 256));
    }

    /// Test samples keep the raw 0-255 range
    #[test]
    fn test_no_normalization_applied() {
        let pixels = uniform_frame(64, 48, [200, 100, 50]);
        let frame = FrameView::new(&pixels, 64, 48, ColorFormat::Bgr).unwrap();

        let mut preprocessor = CpuPreProcessor::new((32, 16), ColorFormat::Bgr);
        let output = preprocessor.preprocess(&frame).unwrap();

        assert_close(output[[0, 8, 16]], 200.0, "Channel 0");
        assert_close(output[[1, 8, 16]], 100.0, "Channel 1");
        assert_close(output[[2, 8, 16]], 50.0, "Channel 2");
        assert!(
            output.iter().all(|&v| (0.0..=255.0).contains(&v)),
            "All samples should stay in [0, 255]"
        );
    }

    /// Test a wide frame is stretched rather than letterboxed
    #[test]
    fn test_stretch_has_no_padding() {
        // 10:1 aspect ratio would leave large bands if letterboxed
        let pixels = uniform_frame(200, 20, [10, 10, 10]);
        let frame = FrameView::new(&pixels, 200, 20, ColorFormat::Bgr).unwrap();

        let mut preprocessor = CpuPreProcessor::new((32, 32), ColorFormat::Bgr);
        let output = preprocessor.preprocess(&frame).unwrap();

        for &(y, x) in &[(0, 0), (0, 31), (31, 0), (31, 31), (16, 16)] {
            assert_close(output[[0, y, x]], 10.0, "Stretched corner");
        }
    }

    /// Test HWC to CHW layout on a frame already at model size
    #[test]
    fn test_hwc_to_chw_layout() {
        let pixels = vec![
            1, 2, 3, // (0, 0)
            4, 5, 6, // (0, 1)
            7, 8, 9, // (1, 0)
            10, 11, 12, // (1, 1)
        ];
        let frame = FrameView::new(&pixels, 2, 2, ColorFormat::Bgr).unwrap();

        let mut preprocessor = CpuPreProcessor::new((2, 2), ColorFormat::Bgr);
        let output = preprocessor.preprocess(&frame).unwrap();

        assert_eq!(output[[0, 0, 0]], 1.0);
        assert_eq!(output[[1, 0, 0]], 2.0);
        assert_eq!(output[[2, 0, 0]], 3.0);
        assert_eq!(output[[0, 0, 1]], 4.0);
        assert_eq!(output[[0, 1, 0]], 7.0);
        assert_eq!(output[[2, 1, 1]], 12.0);
    }

    /// Test RGB frames are reordered for a BGR model
    #[test]
    fn test_rgb_frame_reordered_to_bgr() {
        let pixels = uniform_frame(2, 2, [10, 20, 30]);
        let frame = FrameView::new(&pixels, 2, 2, ColorFormat::Rgb).unwrap();

        let mut preprocessor = CpuPreProcessor::new((2, 2), ColorFormat::Bgr);
        let output = preprocessor.preprocess(&frame).unwrap();

        assert_eq!(output[[0, 0, 0]], 30.0, "Blue should come first");
        assert_eq!(output[[1, 0, 0]], 20.0);
        assert_eq!(output[[2, 0, 0]], 10.0, "Red should come last");
    }

    /// Test repeated calls give identical tensors
    #[test]
    fn test_preprocess_is_deterministic() {
        let pixels: Vec<u8> = (0..(97 * 61 * 3)).map(|i| (i % 251) as u8).collect();
        let frame = FrameView::new(&pixels, 97, 61, ColorFormat::Bgr).unwrap();

        let mut preprocessor = CpuPreProcessor::default();
        let first = preprocessor.preprocess(&frame).unwrap();
        let second = preprocessor.preprocess(&frame).unwrap();

        assert_eq!(first, second);
    }

    /// Test the source frame is left untouched
    #[test]
    fn test_frame_not_mutated() {
        let pixels = uniform_frame(50, 40, [1, 2, 3]);
        let original = pixels.clone();
        let frame = FrameView::new(&pixels, 50, 40, ColorFormat::Rgb).unwrap();

        CpuPreProcessor::default().preprocess(&frame).unwrap();

        assert_eq!(pixels, original);
    }
}
