use crate::error::DetectorError;
use ndarray::{ArrayD, ArrayView4};

#[cfg(feature = "ort-backend")]
pub mod ort;
pub mod provider;

pub use provider::{ExecutionProvider, ProviderOptions};

/// Spatial input size declared by the loaded model. Read once at load time
/// and fixed for the lifetime of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputShape {
    pub width: u32,
    pub height: u32,
}

impl ModelInputShape {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a declared `[N, 3, H, W]` input shape. The batch axis may be
    /// dynamic (single images are always sent); the spatial axes may not.
    pub fn from_dims(dims: &[i64]) -> Result<Self, DetectorError> {
        let &[batch, channels, height, width] = dims else {
            return Err(DetectorError::InvalidInputShape {
                dims: dims.to_vec(),
            });
        };

        if batch > 1 || channels != 3 {
            return Err(DetectorError::InvalidInputShape {
                dims: dims.to_vec(),
            });
        }

        if height <= 0 || width <= 0 {
            return Err(DetectorError::DynamicInputShape {
                dims: dims.to_vec(),
            });
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
        })
    }

    /// (width, height), the order the preprocessor takes.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub trait InferenceBackend {
    /// Model input shape discovered when the model was loaded.
    fn input_shape(&self) -> ModelInputShape;

    /// Run one forward pass on a `[1, 3, H, W]` tensor and return the first
    /// declared output untouched. Engine errors are returned as-is.
    fn infer(&mut self, images: ArrayView4<'_, f32>) -> anyhow::Result<ArrayD<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the shipped 1x3x256x320 export
    #[test]
    fn test_static_shape() {
        let shape = ModelInputShape::from_dims(&[1, 3, 256, 320]).unwrap();
        assert_eq!(shape, ModelInputShape::new(320, 256));
        assert_eq!(shape.size(), (320, 256));
    }

    /// Test a symbolic batch axis is accepted
    #[test]
    fn test_dynamic_batch_accepted() {
        let shape = ModelInputShape::from_dims(&[-1, 3, 480, 640]).unwrap();
        assert_eq!(shape.size(), (640, 480));
    }

    /// Test shapes the pipeline cannot feed
    #[test]
    fn test_rejected_shapes() {
        assert_eq!(
            ModelInputShape::from_dims(&[1, 3, -1, -1]),
            Err(DetectorError::DynamicInputShape {
                dims: vec![1, 3, -1, -1]
            })
        );
        assert!(matches!(
            ModelInputShape::from_dims(&[1, 1, 256, 320]),
            Err(DetectorError::InvalidInputShape { .. })
        ));
        assert!(matches!(
            ModelInputShape::from_dims(&[4, 3, 256, 320]),
            Err(DetectorError::InvalidInputShape { .. })
        ));
        assert!(matches!(
            ModelInputShape::from_dims(&[3, 256, 320]),
            Err(DetectorError::InvalidInputShape { .. })
        ));
    }
}
