use thiserror::Error;

/// Conditions the detector itself rejects. Engine failures are not mapped
/// here; they travel unchanged inside `anyhow::Error`.
#[derive(Error, Debug, PartialEq)]
pub enum DetectorError {
    #[error("Raw output must be [N, 7] or [1, N, 7], got {shape:?}")]
    InvalidOutputShape { shape: Vec<usize> },

    #[error("Model input must be [1, 3, H, W], got {dims:?}")]
    InvalidInputShape { dims: Vec<i64> },

    #[error("Model input has dynamic spatial dimensions: {dims:?}")]
    DynamicInputShape { dims: Vec<i64> },

    #[error("Model declares no inputs")]
    MissingInput,

    #[error("Model declares no outputs")]
    MissingOutput,

    #[error("Unknown execution provider '{0}' (expected cpu, cuda or tensorrt)")]
    UnknownExecutionProvider(String),

    #[error("Invalid value '{value}' for {provider} option '{key}'")]
    InvalidProviderOption {
        provider: &'static str,
        key: String,
        value: String,
    },

    #[error("Class score threshold must be finite, got {0}")]
    InvalidThreshold(f32),
}
