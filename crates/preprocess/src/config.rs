use std::str::FromStr;

/// Side of the square detector input, in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 300;

/// Plane arrangement a frame source promises to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaneLayout {
    /// Full-resolution luma plus two half-resolution chroma planes, each with
    /// its own row and pixel stride (I420, NV12 and NV21 all fit).
    #[default]
    Yuv420,
    /// A single interleaved RGBA plane.
    Rgba8888,
}

impl PlaneLayout {
    pub fn plane_count(&self) -> usize {
        match self {
            PlaneLayout::Yuv420 => 3,
            PlaneLayout::Rgba8888 => 1,
        }
    }
}

/// Quantization range of the luma/chroma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// BT.601 video range: Y in [16, 235], chroma in [16, 240].
    #[default]
    Limited,
    /// BT.601 full range: all components span [0, 255].
    Full,
}

impl FromStr for ColorRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "limited" | "video" | "tv" => Ok(ColorRange::Limited),
            "full" | "pc" | "jpeg" => Ok(ColorRange::Full),
            other => Err(format!("unknown color range '{other}' (expected limited|full)")),
        }
    }
}

/// What the frame producer declares about its frames, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCapabilities {
    pub layout: PlaneLayout,
    pub range: ColorRange,
    /// Convert rows on the rayon pool instead of the calling thread.
    pub parallel: bool,
}

impl FrameCapabilities {
    pub fn yuv420(range: ColorRange) -> Self {
        Self {
            layout: PlaneLayout::Yuv420,
            range,
            parallel: false,
        }
    }

    pub fn rgba8888() -> Self {
        Self {
            layout: PlaneLayout::Rgba8888,
            ..Self::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
