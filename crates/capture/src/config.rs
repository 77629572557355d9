use anyhow::{Context, ensure};
use common::{Environment, env_or};
use preprocess::PlaneLayout;
use std::path::PathBuf;
use std::str::FromStr;

/// Byte layout of the frames stored in a raw capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Planar Y, then U, then V.
    I420,
    /// Planar Y, then interleaved V/U.
    Nv21,
    /// Packed 8-bit RGBA.
    Rgba,
}

impl FrameFormat {
    /// Bytes one frame occupies in the file.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            FrameFormat::I420 | FrameFormat::Nv21 => pixels + pixels / 2,
            FrameFormat::Rgba => pixels * 4,
        }
    }

    pub fn layout(&self) -> PlaneLayout {
        match self {
            FrameFormat::I420 | FrameFormat::Nv21 => PlaneLayout::Yuv420,
            FrameFormat::Rgba => PlaneLayout::Rgba8888,
        }
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "i420" | "yuv420p" => Ok(FrameFormat::I420),
            "nv21" => Ok(FrameFormat::Nv21),
            "rgba" | "rgba8888" => Ok(FrameFormat::Rgba),
            other => Err(format!("unknown frame format '{other}' (expected i420|nv21|rgba)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub environment: Environment,
    pub frame_file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub rotation_degrees: i32,
    pub fps: f64,
    pub pool_size: usize,
    pub loop_playback: bool,
}

impl CaptureConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            environment: Environment::from_env(),
            frame_file: env_or("FRAME_FILE", PathBuf::from("frames.yuv"))?,
            width: env_or("FRAME_WIDTH", 640)?,
            height: env_or("FRAME_HEIGHT", 480)?,
            format: env_or("FRAME_FORMAT", FrameFormat::I420)?,
            rotation_degrees: env_or("ROTATION_DEGREES", 0)?,
            fps: env_or("CAPTURE_FPS", 30.0)?,
            pool_size: env_or("POOL_SIZE", 4)?,
            loop_playback: env_or("LOOP_PLAYBACK", false)?,
        };

        config.validate().context("Invalid capture configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "frame size {}x{} must be non-zero",
            self.width,
            self.height
        );
        if self.format.layout() == PlaneLayout::Yuv420 {
            ensure!(
                self.width % 2 == 0 && self.height % 2 == 0,
                "4:2:0 frames need even dimensions, got {}x{}",
                self.width,
                self.height
            );
        }
        ensure!(
            self.rotation_degrees % 90 == 0,
            "rotation must be a multiple of 90 degrees, got {}",
            self.rotation_degrees
        );
        ensure!(self.fps > 0.0, "CAPTURE_FPS must be positive, got {}", self.fps);
        ensure!(self.pool_size > 0, "POOL_SIZE must be at least 1");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const KEYS: [&str; 8] = [
        "FRAME_FILE",
        "FRAME_WIDTH",
        "FRAME_HEIGHT",
        "FRAME_FORMAT",
        "ROTATION_DEGREES",
        "CAPTURE_FPS",
        "POOL_SIZE",
        "LOOP_PLAYBACK",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.frame_file, PathBuf::from("frames.yuv"));
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.format, FrameFormat::I420);
        assert_eq!(config.rotation_degrees, 0);
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.pool_size, 4);
        assert!(!config.loop_playback);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        unsafe {
            env::set_var("FRAME_FORMAT", "nv21");
            env::set_var("ROTATION_DEGREES", "270");
            env::set_var("LOOP_PLAYBACK", "true");
        }
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.format, FrameFormat::Nv21);
        assert_eq!(config.rotation_degrees, 270);
        assert!(config.loop_playback);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_odd_yuv_dimensions_rejected() {
        clear_env();
        unsafe { env::set_var("FRAME_WIDTH", "641") };
        let err = CaptureConfig::from_env().unwrap_err();
        assert!(format!("{err:#}").contains("even dimensions"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_format_names_variable() {
        clear_env();
        unsafe { env::set_var("FRAME_FORMAT", "bayer") };
        let err = CaptureConfig::from_env().unwrap_err();
        assert!(format!("{err:#}").contains("FRAME_FORMAT"));
        clear_env();
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(FrameFormat::I420.frame_len(4, 2), 12);
        assert_eq!(FrameFormat::Nv21.frame_len(4, 2), 12);
        assert_eq!(FrameFormat::Rgba.frame_len(4, 2), 32);
    }
}
