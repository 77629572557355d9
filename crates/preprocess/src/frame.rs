use std::fmt;

/// One plane of a multi-plane pixel buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the start of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row.
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// Valid sub-region of a frame, in source pixel coordinates.
/// `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// The same region at half resolution, as used by 4:2:0 chroma planes.
    pub fn halved(&self) -> Self {
        Self::new(self.left / 2, self.top / 2, self.right / 2, self.bottom / 2)
    }
}

/// Invoked exactly once with the frame's planes when the frame is dropped,
/// handing the buffers back to whoever produced them.
pub type ReleaseHook = Box<dyn FnOnce(Vec<Plane>) + Send>;

/// A captured sensor frame.
///
/// The pipeline takes frames by value and drops them as soon as their pixels
/// have been converted; dropping runs the release hook, so a frame can never
/// be released twice and is released on every exit path.
pub struct Frame {
    width: u32,
    height: u32,
    planes: Vec<Plane>,
    crop: CropRect,
    rotation_degrees: i32,
    sequence: u64,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(width: u32, height: u32, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            planes,
            crop: CropRect::full(width, height),
            rotation_degrees: 0,
            sequence: 0,
            release: None,
        }
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_rotation(mut self, rotation_degrees: i32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Vec<Plane>) + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(std::mem::take(&mut self.planes));
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("planes", &self.planes.len())
            .field("crop", &self.crop)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("sequence", &self.sequence)
            .finish()
    }
}
