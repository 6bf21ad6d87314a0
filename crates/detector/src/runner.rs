use crate::{
    backend::InferenceBackend,
    pipeline::DetectionPipeline,
    postprocessing::{DetectionClass, DetectionSet},
};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use preprocess::{ColorFormat, FrameView};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

struct RunnerMetrics {
    duration_histogram: Histogram<f64>,
    frames_counter: Counter<u64>,
    failed_counter: Counter<u64>,
    detections_counter: Counter<u64>,
}

impl RunnerMetrics {
    fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.007, 0.01, 0.015, 0.02, 0.025, 0.03, 0.04, 0.05, 0.075, 0.1,
            0.15, 0.2, 0.5,
        ];
        Self {
            duration_histogram: meter
                .f64_histogram("detector_frame_duration_seconds")
                .with_description("Time to detect a single frame (preprocess + infer + postprocess)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            frames_counter: meter
                .u64_counter("detector_frames_total")
                .with_description("Total frames processed")
                .build(),
            failed_counter: meter
                .u64_counter("detector_frames_failed_total")
                .with_description("Total frames that failed to load or detect")
                .build(),
            detections_counter: meter
                .u64_counter("detector_detections_total")
                .with_description("Total detections produced")
                .build(),
        }
    }
}

/// One output line per processed frame.
#[derive(Debug, Serialize)]
pub struct FrameRecord<'a> {
    pub frame: u64,
    pub source: &'a str,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: f64,
    pub detections: Vec<DetectionRecord>,
}

#[derive(Debug, Serialize)]
pub struct DetectionRecord {
    pub class_id: i32,
    pub class: Option<&'static str>,
    pub score: f32,
    pub bbox: [u32; 4],
}

impl DetectionRecord {
    fn from_set(detections: &DetectionSet) -> Vec<Self> {
        detections
            .iter()
            .map(|d| Self {
                class_id: d.class_id,
                class: DetectionClass::from_id(d.class_id).map(|c| c.name()),
                score: d.score,
                bbox: [d.x_min, d.y_min, d.x_max, d.y_max],
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub total_detections: u64,
}

/// Drives a pipeline over a directory of still images, one frame at a time,
/// writing one JSON line per frame to `out`.
pub struct FrameRunner<B: InferenceBackend, W: Write> {
    pipeline: DetectionPipeline<B>,
    out: W,
    metrics: RunnerMetrics,
}

impl<B: InferenceBackend, W: Write> FrameRunner<B, W> {
    pub fn new(pipeline: DetectionPipeline<B>, out: W) -> Self {
        Self {
            pipeline,
            out,
            metrics: RunnerMetrics::new("detector"),
        }
    }

    pub fn into_inner(self) -> (DetectionPipeline<B>, W) {
        (self.pipeline, self.out)
    }

    /// Process every image under `dir` in file name order.
    ///
    /// A frame that fails to decode or detect is logged and skipped; only a
    /// missing directory or a broken output sink aborts the run.
    pub fn run_dir(&mut self, dir: &Path) -> anyhow::Result<RunSummary> {
        let frames = list_frames(dir)?;
        tracing::info!(dir = %dir.display(), frames = frames.len(), "Starting detection loop");

        let mut summary = RunSummary::default();

        for (index, path) in frames.iter().enumerate() {
            match self.process_file(index as u64, path) {
                Ok(FrameOutcome {
                    detections,
                    detect_secs,
                }) => {
                    self.metrics.duration_histogram.record(detect_secs, &[]);
                    self.metrics.frames_counter.add(1, &[]);
                    self.metrics.detections_counter.add(detections as u64, &[]);

                    summary.frames_processed += 1;
                    summary.total_detections += detections as u64;

                    if summary.frames_processed.is_multiple_of(10) {
                        tracing::debug!(
                            frames_processed = summary.frames_processed,
                            total_detections = summary.total_detections,
                            detections,
                            "Frame processed"
                        );
                    }
                }
                Err(e) if is_sink_error(&e) => return Err(e),
                Err(e) => {
                    self.metrics.failed_counter.add(1, &[]);
                    summary.frames_failed += 1;
                    tracing::error!(path = %path.display(), error = %e, "Failed to process frame");
                }
            }
        }

        self.out.flush().map_err(SinkError::from)?;
        Ok(summary)
    }

    fn process_file(&mut self, index: u64, path: &Path) -> anyhow::Result<FrameOutcome> {
        let _span = tracing::info_span!("detector_process_frame", frame = index).entered();

        let image = image::open(path)?.to_rgb8();
        let (width, height) = image.dimensions();
        let frame = FrameView::new(image.as_raw(), width, height, ColorFormat::Rgb)?;

        // Only preprocess + infer + postprocess are timed
        let start = Instant::now();
        let detections = self.pipeline.detect(&frame)?;
        let detect_secs = start.elapsed().as_secs_f64();
        let elapsed_ms = detect_secs * 1000.0;
        tracing::debug!(frame = index, elapsed_ms, detections = detections.len(), "Frame detected");

        let source = path.to_string_lossy();
        let record = FrameRecord {
            frame: index,
            source: &source,
            width,
            height,
            elapsed_ms,
            detections: DetectionRecord::from_set(&detections),
        };

        serde_json::to_writer(&mut self.out, &record).map_err(SinkError::from)?;
        self.out.write_all(b"\n").map_err(SinkError::from)?;

        Ok(FrameOutcome {
            detections: detections.len(),
            detect_secs,
        })
    }
}

struct FrameOutcome {
    detections: usize,
    detect_secs: f64,
}

#[derive(Debug, thiserror::Error)]
enum SinkError {
    #[error("Failed to write detections: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize detections: {0}")]
    Json(#[from] serde_json::Error),
}

fn is_sink_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SinkError>().is_some()
}

/// Image files directly under `dir`, sorted by path.
pub fn list_frames(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
