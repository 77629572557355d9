pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod pipeline;
pub mod processor;

// Re-export commonly used types for convenience
pub use config::{DetectorConfig, InferenceConfig, ProcessorSettings};
pub use detector::{BoundingBox, Detector, LabelMap, RawDetection, UNKNOWN_LABEL};
pub use error::PipelineError;
pub use mapping::{DisplayDetection, FrameResult, ResultMapper};
pub use pipeline::{FramePipeline, PipelineStats};
pub use processor::{FrameProcessor, PipelineState, StateCell};
