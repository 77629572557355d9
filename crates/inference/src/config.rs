use anyhow::{Context, ensure};
use common::{env_opt, env_or};
use preprocess::{ColorRange, DEFAULT_INPUT_SIZE, FrameCapabilities};
use std::path::PathBuf;

pub use common::Environment;

/// Everything the detector needs at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub minimum_confidence: f32,
    pub num_detections: usize,
    pub input_size: u32,
    pub is_quantized: bool,
    pub model_file: PathBuf,
    pub labels_file: PathBuf,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            minimum_confidence: 0.5,
            num_detections: 10,
            input_size: DEFAULT_INPUT_SIZE,
            is_quantized: true,
            model_file: PathBuf::from("detect.onnx"),
            labels_file: PathBuf::from("labelmap.txt"),
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            minimum_confidence: env_or("MINIMUM_CONFIDENCE", defaults.minimum_confidence)?,
            num_detections: env_or("NUM_DETECTIONS", defaults.num_detections)?,
            input_size: env_or("INPUT_SIZE", defaults.input_size)?,
            is_quantized: env_or("IS_QUANTIZED", defaults.is_quantized)?,
            model_file: env_or("MODEL_FILE", defaults.model_file)?,
            labels_file: env_or("LABELS_FILE", defaults.labels_file)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.minimum_confidence),
            "MINIMUM_CONFIDENCE must be within [0, 1], got {}",
            self.minimum_confidence
        );
        ensure!(self.num_detections > 0, "NUM_DETECTIONS must be positive");
        ensure!(self.input_size > 0, "INPUT_SIZE must be positive");
        Ok(())
    }
}

/// Knobs of a single processing pass, independent of where they came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSettings {
    pub capabilities: FrameCapabilities,
    pub input_size: u32,
    pub num_detections: usize,
    /// Canvas detections are mapped onto; model input space when `None`.
    pub display_size: Option<(u32, u32)>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            capabilities: FrameCapabilities::default(),
            input_size: DEFAULT_INPUT_SIZE,
            num_detections: 10,
            display_size: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub detector: DetectorConfig,
    pub display_size: Option<(u32, u32)>,
    pub capabilities: FrameCapabilities,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();
        let otel_endpoint = env_opt("OTEL_EXPORTER_OTLP_ENDPOINT")?;
        let detector = DetectorConfig::from_env().context("Invalid detector configuration")?;

        let display_size = match (
            env_opt::<u32>("DISPLAY_WIDTH")?,
            env_opt::<u32>("DISPLAY_HEIGHT")?,
        ) {
            (Some(w), Some(h)) => {
                ensure!(w > 0 && h > 0, "Display size {w}x{h} must be non-zero");
                Some((w, h))
            }
            (None, None) => None,
            _ => anyhow::bail!("DISPLAY_WIDTH and DISPLAY_HEIGHT must be set together"),
        };

        let capabilities = FrameCapabilities::yuv420(env_or("COLOR_RANGE", ColorRange::Limited)?)
            .with_parallel(env_or("PARALLEL_CONVERSION", false)?);

        Ok(Self {
            environment,
            otel_endpoint,
            detector,
            display_size,
            capabilities,
        })
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            capabilities: self.capabilities,
            input_size: self.detector.input_size,
            num_detections: self.detector.num_detections,
            display_size: self.display_size,
        }
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            otel_endpoint: None,
            detector: DetectorConfig::default(),
            display_size: None,
            capabilities: FrameCapabilities::default(),
        }
    }
}
