use capture::{CaptureConfig, Captured, FramePacing, RawFrameSource};
use common::TelemetryGuard;
use inference::{
    Detector, FramePipeline, FrameProcessor, InferenceConfig, LabelMap, PipelineError,
    ResultMapper, backend::ort::OrtDetector, logging::setup_logging,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::from_env()?;
    let capture_config = CaptureConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("inference", endpoint, config.environment)?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(
        config = ?config,
        capture = ?capture_config,
        "Loaded configuration"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let labels = LabelMap::from_file(&config.detector.labels_file)?;

    tracing::info!("Loading detection model");
    let detector = OrtDetector::load(&config.detector)?;

    let mut settings = config.processor_settings();
    settings.capabilities.layout = capture_config.format.layout();

    let processor = FrameProcessor::new(detector, ResultMapper::new(labels), settings)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = Arc::new(FramePipeline::start(processor, tx)?);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(result) = rx.recv().await {
            match serde_json::to_string(&result) {
                Ok(line) => {
                    if writeln!(stdout, "{line}").is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize frame result"),
            }
        }
    });

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || produce(capture_config, &pipeline, &shutdown))
    };

    producer.await??;
    pipeline.shutdown();
    printer.await?;

    let stats = pipeline.stats();
    tracing::info!(
        submitted = stats.submitted,
        superseded = stats.superseded,
        processed = stats.processed,
        failed = stats.failed,
        "Inference finished"
    );

    Ok(())
}

/// Paced capture loop; returns on end of input, shutdown signal or a closed
/// pipeline.
fn produce(
    config: CaptureConfig,
    pipeline: &FramePipeline,
    shutdown: &AtomicBool,
) -> anyhow::Result<()> {
    let mut source = RawFrameSource::open(&config)?;
    let mut pacing = FramePacing::new(config.fps);

    tracing::info!(
        file = %source.path().display(),
        fps = config.fps,
        "Starting capture loop"
    );

    while !shutdown.load(Ordering::Relaxed) {
        pacing.wait();

        match source.next_frame()? {
            Captured::Frame(frame) => match pipeline.submit(frame) {
                Ok(()) => {}
                Err(PipelineError::ShutDown) => {
                    tracing::warn!("Pipeline stopped accepting frames");
                    break;
                }
                Err(e) => return Err(e.into()),
            },
            Captured::Skipped => {}
            Captured::EndOfStream => {
                tracing::info!("End of input reached");
                break;
            }
        }
    }

    tracing::info!(skipped = source.skipped(), "Capture loop stopped");
    Ok(())
}
