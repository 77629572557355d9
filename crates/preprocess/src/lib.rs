pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod packed;
pub mod resample;
pub mod scratch;
pub mod transform;

pub use config::{ColorRange, DEFAULT_INPUT_SIZE, FrameCapabilities, PlaneLayout};
pub use convert::ColorConverter;
pub use error::PreprocessError;
pub use frame::{CropRect, Frame, Plane, ReleaseHook};
pub use packed::PackedPixelBuffer;
pub use resample::FrameResampler;
pub use scratch::alloc_surface;
pub use transform::{AffineTransform, TransformPlanner, transform_matrix};

/// Interleaved 8-bit RGBA surface produced by conversion.
pub type RgbaSurface = image::RgbaImage;
