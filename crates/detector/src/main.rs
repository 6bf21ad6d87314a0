use common::TelemetryGuard;
use detector::{DetectionPipeline, DetectorConfig, FrameRunner, logging::setup_logging};
use std::io;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DetectorConfig::from_env()?;

    // The telemetry guard installs the subscriber itself when an endpoint is set
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "detector",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config)?;
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    tracing::info!("Loading detection model");
    let pipeline = DetectionPipeline::from_config(&config)?;
    tracing::info!(
        inputs = ?pipeline.backend().input_names(),
        output = pipeline.backend().output_name(),
        class_score_th = pipeline.class_score_th(),
        "Model loaded successfully"
    );

    let stdout = io::stdout();
    let mut runner = FrameRunner::new(pipeline, stdout.lock());
    let summary = runner.run_dir(&config.input_dir)?;

    tracing::info!(
        frames_processed = summary.frames_processed,
        frames_failed = summary.frames_failed,
        total_detections = summary.total_detections,
        "Detection run finished"
    );

    Ok(())
}
