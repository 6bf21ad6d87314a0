use super::provider::{
    DEVICE_ID, ExecutionProvider, TRT_ENGINE_CACHE_ENABLE, TRT_ENGINE_CACHE_PATH, TRT_FP16_ENABLE,
};
use super::{InferenceBackend, ModelInputShape};
use crate::error::DetectorError;
use anyhow::Context;
use ndarray::{ArrayD, ArrayView4};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// ONNX Runtime session plus the names and input shape discovered at load.
pub struct OrtBackend {
    session: Session,
    input_names: Vec<String>,
    output_name: String,
    input_shape: ModelInputShape,
}

impl OrtBackend {
    /// Load model with an ordered provider preference list
    pub fn load_model_with_providers(
        path: &str,
        providers: &[ExecutionProvider],
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let dispatch = providers
            .iter()
            .map(to_dispatch)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            providers = ?providers.iter().map(ExecutionProvider::name).collect::<Vec<_>>(),
            intra_threads,
            "Initializing ONNX Runtime session"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(dispatch)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|input| input.name().to_string())
            .collect();

        let first_input = session.inputs().first().ok_or(DetectorError::MissingInput)?;
        let dims: Vec<i64> = first_input
            .dtype()
            .tensor_shape()
            .map(|shape| shape.to_vec())
            .ok_or_else(|| DetectorError::InvalidInputShape { dims: Vec::new() })?;
        let input_shape = ModelInputShape::from_dims(&dims)?;

        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or(DetectorError::MissingOutput)?;

        tracing::info!(
            path,
            width = input_shape.width,
            height = input_shape.height,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_names,
            output_name,
            input_shape,
        })
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

fn to_dispatch(provider: &ExecutionProvider) -> Result<ExecutionProviderDispatch, DetectorError> {
    let dispatch = match provider {
        ExecutionProvider::Cpu(_) => CPUExecutionProvider::default().build(),
        ExecutionProvider::Cuda(_) => {
            let mut ep = CUDAExecutionProvider::default();
            if let Some(device_id) = provider.parse_option::<i32>(DEVICE_ID)? {
                ep = ep.with_device_id(device_id);
            }
            ep.build()
        }
        ExecutionProvider::TensorRt(_) => {
            let mut ep = TensorRTExecutionProvider::default();
            if let Some(device_id) = provider.parse_option::<i32>(DEVICE_ID)? {
                ep = ep.with_device_id(device_id);
            }
            if let Some(enable) = provider.flag(TRT_ENGINE_CACHE_ENABLE)? {
                ep = ep.with_engine_cache(enable);
            }
            if let Some(path) = provider.option(TRT_ENGINE_CACHE_PATH) {
                ep = ep.with_engine_cache_path(path);
            }
            if let Some(fp16) = provider.flag(TRT_FP16_ENABLE)? {
                ep = ep.with_fp16(fp16);
            }
            ep.build()
        }
    };
    Ok(dispatch)
}

impl InferenceBackend for OrtBackend {
    fn input_shape(&self) -> ModelInputShape {
        self.input_shape
    }

    fn infer(&mut self, images: ArrayView4<'_, f32>) -> anyhow::Result<ArrayD<f32>> {
        // Every declared input receives the image tensor
        let mut inputs = Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            inputs.push((name.as_str(), TensorRef::from_array_view(images.view())?));
        }

        let outputs = self.session.run(inputs)?;
        let raw = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        Ok(raw.into_owned())
    }
}
