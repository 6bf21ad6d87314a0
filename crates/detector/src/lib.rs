pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod postprocessing;
pub mod runner;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend, ModelInputShape};
pub use config::DetectorConfig;
pub use error::DetectorError;
pub use pipeline::DetectionPipeline;
pub use postprocessing::{
    BoundingBox, Detection, DetectionClass, DetectionSet, PostProcessor, RawDetection,
};
pub use preprocess::{ColorFormat, FrameView};
pub use runner::{FrameRunner, RunSummary};
