use preprocess::PreprocessError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("Detector failed: {0:#}")]
    Detector(anyhow::Error),

    #[error("Invalid result mapping: {0}")]
    Mapping(String),

    #[error("Pipeline is shut down")]
    ShutDown,

    #[error("Failed to spawn pipeline worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl PipelineError {
    /// Fatal errors stop the pipeline; everything else drops one frame.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Preprocess(e) => e.is_fatal(),
            PipelineError::Spawn(_) => true,
            _ => false,
        }
    }
}
