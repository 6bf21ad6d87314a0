pub mod cpu;
pub mod frame;

use ndarray::Array3;

pub use cpu::CpuPreProcessor;
pub use frame::{ColorFormat, FrameError, FrameView};

/// (width, height) of the shipped `1x3x256x320` body/head/hand export.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (320, 256);

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Turn a frame into a `[3, height, width]` f32 tensor at the model's
    /// input size.
    fn preprocess(&mut self, frame: &FrameView<'_>) -> anyhow::Result<Array3<f32>>;

    /// (width, height) this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}
