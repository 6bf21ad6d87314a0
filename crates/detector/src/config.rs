use crate::backend::provider::{DEVICE_ID, ExecutionProvider};
use std::env;
use std::path::PathBuf;

pub use common::Environment;

pub const DEFAULT_MODEL_PATH: &str = "yolox_s_body_head_hand_post_0299_0.4983_1x3x256x320.onnx";
pub const DEFAULT_CLASS_SCORE_THRESHOLD: f32 = 0.35;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub environment: Environment,
    pub model_path: String,
    pub class_score_th: f32,
    pub execution_providers: Vec<ExecutionProvider>,
    pub intra_threads: usize,
    pub input_dir: PathBuf,
    pub otel_endpoint: Option<String>,
}

impl DetectorConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model_path = env::var("MODEL_PATH").unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());

        let class_score_th = env::var("CLASS_SCORE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CLASS_SCORE_THRESHOLD);

        let device_id: i32 = env::var("CUDA_DEVICE_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let trt_cache_path =
            env::var("TRT_ENGINE_CACHE_PATH").unwrap_or_else(|_| ".".to_string());

        let trt_fp16 = env::var("TRT_FP16")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let provider = env::var("EXECUTION_PROVIDER").unwrap_or_else(|_| "cpu".to_string());
        let execution_providers = ExecutionProvider::preset(
            &provider,
            ExecutionProvider::cuda().with_option(DEVICE_ID, device_id),
            ExecutionProvider::tensorrt(&trt_cache_path, trt_fp16).with_option(DEVICE_ID, device_id),
        )?;

        let intra_threads = env::var("INTRA_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        let input_dir = env::var("INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("frames"));

        let otel_endpoint = env::var("OTEL_ENDPOINT").ok().filter(|s| !s.is_empty());

        Ok(Self {
            environment,
            model_path,
            class_score_th,
            execution_providers,
            intra_threads,
            input_dir,
            otel_endpoint,
        })
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: DEFAULT_MODEL_PATH.to_string(),
            class_score_th: DEFAULT_CLASS_SCORE_THRESHOLD,
            execution_providers: vec![ExecutionProvider::cpu()],
            intra_threads: 4,
            input_dir: PathBuf::from("frames"),
            otel_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectorError;
    use serial_test::serial;

    const VARS: [&str; 9] = [
        "MODEL_PATH",
        "CLASS_SCORE_THRESHOLD",
        "CUDA_DEVICE_ID",
        "TRT_ENGINE_CACHE_PATH",
        "TRT_FP16",
        "EXECUTION_PROVIDER",
        "INTRA_THREADS",
        "INPUT_DIR",
        "OTEL_ENDPOINT",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    /// Test defaults match the shipped model and CPU execution
    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();

        let config = DetectorConfig::from_env().unwrap();
        let expected = DetectorConfig::test_default();

        assert_eq!(config.model_path, expected.model_path);
        assert_eq!(config.class_score_th, 0.35);
        assert_eq!(config.execution_providers, expected.execution_providers);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.input_dir, PathBuf::from("frames"));
        assert!(config.otel_endpoint.is_none());
    }

    /// Test the tensorrt preset carries cache options and falls back
    #[test]
    #[serial]
    fn test_tensorrt_preset_from_env() {
        clear_env();
        unsafe {
            env::set_var("EXECUTION_PROVIDER", "tensorrt");
            env::set_var("TRT_ENGINE_CACHE_PATH", "/var/cache/trt");
            env::set_var("TRT_FP16", "false");
            env::set_var("CUDA_DEVICE_ID", "1");
            env::set_var("CLASS_SCORE_THRESHOLD", "0.5");
        }

        let config = DetectorConfig::from_env().unwrap();
        clear_env();

        let names: Vec<_> = config
            .execution_providers
            .iter()
            .map(ExecutionProvider::name)
            .collect();
        assert_eq!(names, ["tensorrt", "cuda", "cpu"]);

        let trt = &config.execution_providers[0];
        assert_eq!(trt.option("trt_engine_cache_path"), Some("/var/cache/trt"));
        assert_eq!(trt.flag("trt_fp16_enable"), Ok(Some(false)));
        assert_eq!(trt.parse_option::<i32>(DEVICE_ID), Ok(Some(1)));
        assert_eq!(config.class_score_th, 0.5);
    }

    /// Test an unknown provider name is a configuration error
    #[test]
    #[serial]
    fn test_unknown_provider_rejected() {
        clear_env();
        unsafe { env::set_var("EXECUTION_PROVIDER", "openvino") };

        let err = DetectorConfig::from_env().unwrap_err();
        clear_env();

        assert_eq!(
            err.downcast_ref::<DetectorError>(),
            Some(&DetectorError::UnknownExecutionProvider(
                "openvino".to_string()
            ))
        );
    }
}
