use crate::error::DetectorError;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Backend-specific string options, e.g. `trt_engine_cache_path`.
pub type ProviderOptions = BTreeMap<String, String>;

pub const DEVICE_ID: &str = "device_id";
pub const TRT_ENGINE_CACHE_ENABLE: &str = "trt_engine_cache_enable";
pub const TRT_ENGINE_CACHE_PATH: &str = "trt_engine_cache_path";
pub const TRT_FP16_ENABLE: &str = "trt_fp16_enable";

/// One entry of the ordered provider preference list handed to ONNX Runtime.
///
/// The list is resolved once when the session is built; providers that fail
/// to register are skipped in order and ONNX Runtime always keeps CPU as the
/// last resort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu(ProviderOptions),
    Cuda(ProviderOptions),
    TensorRt(ProviderOptions),
}

impl ExecutionProvider {
    pub fn cpu() -> Self {
        Self::Cpu(ProviderOptions::new())
    }

    pub fn cuda() -> Self {
        Self::Cuda(ProviderOptions::new())
    }

    /// TensorRT with engine caching in `cache_path` and fp16 kernels.
    pub fn tensorrt(cache_path: &str, fp16: bool) -> Self {
        let mut options = ProviderOptions::new();
        options.insert(TRT_ENGINE_CACHE_ENABLE.to_string(), "true".to_string());
        options.insert(TRT_ENGINE_CACHE_PATH.to_string(), cache_path.to_string());
        options.insert(TRT_FP16_ENABLE.to_string(), fp16.to_string());
        Self::TensorRt(options)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "cpu",
            Self::Cuda(_) => "cuda",
            Self::TensorRt(_) => "tensorrt",
        }
    }

    pub fn options(&self) -> &ProviderOptions {
        match self {
            Self::Cpu(options) | Self::Cuda(options) | Self::TensorRt(options) => options,
        }
    }

    pub fn with_option(mut self, key: &str, value: impl ToString) -> Self {
        match &mut self {
            Self::Cpu(options) | Self::Cuda(options) | Self::TensorRt(options) => {
                options.insert(key.to_string(), value.to_string());
            }
        }
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options().get(key).map(String::as_str)
    }

    pub fn parse_option<T: FromStr>(&self, key: &str) -> Result<Option<T>, DetectorError> {
        self.option(key)
            .map(|value| {
                value.parse().map_err(|_| DetectorError::InvalidProviderOption {
                    provider: self.name(),
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Accepts true/false and 1/0.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, DetectorError> {
        self.option(key)
            .map(|value| match value.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(DetectorError::InvalidProviderOption {
                    provider: self.name(),
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            })
            .transpose()
    }

    /// Preference list for a named preset. Accelerated presets fall back
    /// through the slower providers: tensorrt -> cuda -> cpu.
    pub fn preset(
        name: &str,
        cuda: ExecutionProvider,
        tensorrt: ExecutionProvider,
    ) -> Result<Vec<ExecutionProvider>, DetectorError> {
        match name.trim().to_lowercase().as_str() {
            "cpu" => Ok(vec![Self::cpu()]),
            "cuda" => Ok(vec![cuda, Self::cpu()]),
            "tensorrt" | "trt" => Ok(vec![tensorrt, cuda, Self::cpu()]),
            other => Err(DetectorError::UnknownExecutionProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the tensorrt constructor carries cache and precision options
    #[test]
    fn test_tensorrt_options() {
        let provider = ExecutionProvider::tensorrt(".", true);

        assert_eq!(provider.name(), "tensorrt");
        assert_eq!(provider.flag(TRT_ENGINE_CACHE_ENABLE), Ok(Some(true)));
        assert_eq!(provider.option(TRT_ENGINE_CACHE_PATH), Some("."));
        assert_eq!(provider.flag(TRT_FP16_ENABLE), Ok(Some(true)));
        assert_eq!(provider.flag(DEVICE_ID), Ok(None));
    }

    /// Test preset expansion keeps fallback order
    #[test]
    fn test_preset_order() {
        let cuda = ExecutionProvider::cuda().with_option(DEVICE_ID, 1);
        let trt = ExecutionProvider::tensorrt("/tmp/trt", false);

        let cpu = ExecutionProvider::preset("cpu", cuda.clone(), trt.clone()).unwrap();
        assert_eq!(cpu, vec![ExecutionProvider::cpu()]);

        let gpu = ExecutionProvider::preset("CUDA", cuda.clone(), trt.clone()).unwrap();
        let names: Vec<_> = gpu.iter().map(ExecutionProvider::name).collect();
        assert_eq!(names, ["cuda", "cpu"]);
        assert_eq!(gpu[0].parse_option::<i32>(DEVICE_ID), Ok(Some(1)));

        let accelerated = ExecutionProvider::preset("tensorrt", cuda, trt.clone()).unwrap();
        let names: Vec<_> = accelerated.iter().map(ExecutionProvider::name).collect();
        assert_eq!(names, ["tensorrt", "cuda", "cpu"]);
        assert_eq!(accelerated[0], trt);
    }

    /// Test unknown preset names are rejected
    #[test]
    fn test_unknown_preset() {
        let err = ExecutionProvider::preset(
            "rocm",
            ExecutionProvider::cuda(),
            ExecutionProvider::tensorrt(".", true),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DetectorError::UnknownExecutionProvider("rocm".to_string())
        );
    }

    /// Test malformed option values surface as errors
    #[test]
    fn test_invalid_option_values() {
        let provider = ExecutionProvider::cuda()
            .with_option(DEVICE_ID, "gpu0")
            .with_option(TRT_FP16_ENABLE, "yes please");

        assert!(provider.parse_option::<i32>(DEVICE_ID).is_err());
        assert_eq!(
            provider.flag(TRT_FP16_ENABLE),
            Err(DetectorError::InvalidProviderOption {
                provider: "cuda",
                key: TRT_FP16_ENABLE.to_string(),
                value: "yes please".to_string(),
            })
        );
    }
}
