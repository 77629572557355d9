use crate::config::DetectorConfig;
use anyhow::Context;
use preprocess::PackedPixelBuffer;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Label shown for class indices the label file does not cover.
pub const UNKNOWN_LABEL: &str = "???";

/// Axis-aligned box; `right` and `bottom` are exclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Scale each horizontal edge by `sx` and each vertical edge by `sy`.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            left: self.left * sx,
            top: self.top * sy,
            right: self.right * sx,
            bottom: self.bottom * sy,
        }
    }
}

/// One detector output in model input space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// An object detector fed with packed model-input pixels.
///
/// Implementations filter by their configured minimum confidence and run
/// their own non-max suppression; callers only cap the count.
pub trait Detector: Send {
    fn load(config: &DetectorConfig) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Detect objects in a square `input_size` x `input_size` buffer,
    /// returning at most `max_detections` entries ordered by the detector.
    fn detect(
        &mut self,
        pixels: &PackedPixelBuffer,
        max_detections: usize,
    ) -> anyhow::Result<Vec<RawDetection>>;
}

/// Class index to display label, one label per line of the labels file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels from {}", path.display()))?;
        let labels = Self::from_lines(contents.lines());

        tracing::info!(path = %path.display(), labels = labels.len(), "Labels loaded");
        Ok(labels)
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            labels: lines
                .into_iter()
                .map(|line| line.as_ref().trim().to_string())
                .collect(),
        }
    }

    pub fn label(&self, class_id: u32) -> &str {
        self.labels
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
