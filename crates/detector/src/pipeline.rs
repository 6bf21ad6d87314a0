use crate::{
    backend::{InferenceBackend, ModelInputShape},
    error::DetectorError,
    postprocessing::{DetectionSet, PostProcessor},
};
use common::span;
use ndarray::Axis;
use preprocess::{ColorFormat, CpuPreProcessor, FrameView, Preprocess};

/// Image in, detections out: preprocess -> infer -> postprocess.
///
/// Owns its backend exclusively. `detect` takes `&mut self`, so one pipeline
/// serves one frame at a time; the model shape and threshold never change
/// after construction.
pub struct DetectionPipeline<B: InferenceBackend> {
    backend: B,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> DetectionPipeline<B> {
    /// Build a pipeline for a BGR-trained model.
    pub fn new(backend: B, class_score_th: f32) -> anyhow::Result<Self> {
        Self::with_channel_order(backend, class_score_th, ColorFormat::Bgr)
    }

    pub fn with_channel_order(
        backend: B,
        class_score_th: f32,
        channel_order: ColorFormat,
    ) -> anyhow::Result<Self> {
        if !class_score_th.is_finite() {
            return Err(DetectorError::InvalidThreshold(class_score_th).into());
        }

        let input_shape = backend.input_shape();
        let preprocessor = CpuPreProcessor::new(input_shape.size(), channel_order);
        let postprocessor = PostProcessor::new(class_score_th, input_shape);

        tracing::debug!(
            width = input_shape.width,
            height = input_shape.height,
            class_score_th,
            channel_order = ?preprocessor.channel_order(),
            "Detection pipeline ready"
        );

        Ok(Self {
            backend,
            preprocessor,
            postprocessor,
        })
    }

    pub fn input_shape(&self) -> ModelInputShape {
        self.postprocessor.input_shape()
    }

    pub fn class_score_th(&self) -> f32 {
        self.postprocessor.class_score_th()
    }

    /// Channel order the model expects; frames in the other order are swapped.
    pub fn channel_order(&self) -> ColorFormat {
        self.preprocessor.channel_order()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Detect bodies, heads and hands in one frame.
    ///
    /// The frame is only read. Backend errors are returned unchanged; an
    /// empty result is not an error.
    pub fn detect(&mut self, frame: &FrameView<'_>) -> anyhow::Result<DetectionSet> {
        let _s = span!("detect", width = frame.width(), height = frame.height());

        let tensor = self.preprocessor.preprocess(frame)?;
        let batched = tensor.insert_axis(Axis(0));

        let raw = {
            let _infer_span = span!("model_inference");
            self.backend.infer(batched.view())?
        };

        let detections = {
            let _post_span = span!("postprocess");
            self.postprocessor
                .parse_detections(&raw.view(), frame.width(), frame.height())?
        };

        tracing::trace!(detections = detections.len(), "Frame detected");

        Ok(detections)
    }
}

#[cfg(feature = "ort-backend")]
impl DetectionPipeline<crate::backend::ort::OrtBackend> {
    /// Load the model described by `config` and wrap it in a pipeline.
    pub fn from_config(config: &crate::config::DetectorConfig) -> anyhow::Result<Self> {
        let backend = crate::backend::ort::OrtBackend::load_model_with_providers(
            &config.model_path,
            &config.execution_providers,
            config.intra_threads,
        )?;
        Self::new(backend, config.class_score_th)
    }
}
