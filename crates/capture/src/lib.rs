pub mod config;
pub mod pacing;
pub mod pool;
pub mod source;

pub use config::{CaptureConfig, FrameFormat};
pub use pacing::FramePacing;
pub use pool::{FramePool, PoolLease};
pub use source::{Captured, RawFrameSource};
