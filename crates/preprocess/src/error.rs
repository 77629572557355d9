use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Unsupported frame format: {0}")]
    Format(String),

    #[error("Invalid transform: {0}")]
    Transform(String),

    #[error("Scratch buffer unavailable: {0}")]
    Resource(String),

    #[error("Resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("Invalid image buffer: {0}")]
    ImageBuffer(#[from] fast_image_resize::ImageBufferError),
}

impl PreprocessError {
    /// Resource failures leave the owning pipeline without its scratch
    /// buffers; everything else only affects the current frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PreprocessError::Resource(_))
    }
}

impl From<TryReserveError> for PreprocessError {
    fn from(e: TryReserveError) -> Self {
        PreprocessError::Resource(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = PreprocessError::Format("row stride 10 < 12".to_string());
        assert_eq!(err.to_string(), "Unsupported frame format: row stride 10 < 12");

        let err = PreprocessError::Transform("determinant is zero".to_string());
        assert_eq!(err.to_string(), "Invalid transform: determinant is zero");

        let err = PreprocessError::Resource("out of memory".to_string());
        assert_eq!(err.to_string(), "Scratch buffer unavailable: out of memory");
    }

    #[test]
    fn test_only_resource_errors_are_fatal() {
        assert!(PreprocessError::Resource(String::new()).is_fatal());
        assert!(!PreprocessError::Format(String::new()).is_fatal());
        assert!(!PreprocessError::Transform(String::new()).is_fatal());
    }

    #[test]
    fn test_conversion_from_try_reserve_error() {
        let mut v: Vec<u8> = Vec::new();
        let reserve_err = v.try_reserve_exact(usize::MAX).unwrap_err();
        let err: PreprocessError = reserve_err.into();
        assert!(err.is_fatal(), "Allocation failure should map to Resource");
    }
}
