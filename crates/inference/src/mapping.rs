use crate::detector::{BoundingBox, LabelMap, RawDetection};
use crate::error::PipelineError;
use serde::Serialize;

/// A detection in display coordinates, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayDetection {
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl DisplayDetection {
    /// Caption for an overlay, e.g. `"17:dog[0.87]"`.
    pub fn text(&self) -> String {
        format!("{}:{}[{:.2}]", self.class_id, self.label, self.confidence)
    }
}

/// Detections for one processed frame plus the geometry they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    pub sequence: u64,
    pub detections: Vec<DisplayDetection>,
    /// Model input size the detector saw.
    pub image_width: u32,
    pub image_height: u32,
    /// Rotation undone before detection.
    pub rotation_degrees: i32,
    /// Canvas the boxes are expressed in.
    pub display_width: u32,
    pub display_height: u32,
}

impl FrameResult {
    /// The same result with boxes rescaled onto a `width` x `height` canvas.
    pub fn remap(&self, width: u32, height: u32) -> Result<FrameResult, PipelineError> {
        if self.display_width == 0 || self.display_height == 0 || width == 0 || height == 0 {
            return Err(PipelineError::Mapping(format!(
                "cannot remap a {}x{} canvas onto {width}x{height}",
                self.display_width, self.display_height
            )));
        }

        let sx = width as f32 / self.display_width as f32;
        let sy = height as f32 / self.display_height as f32;

        Ok(FrameResult {
            detections: self
                .detections
                .iter()
                .map(|d| DisplayDetection {
                    bbox: d.bbox.scaled(sx, sy),
                    ..d.clone()
                })
                .collect(),
            display_width: width,
            display_height: height,
            ..self.clone()
        })
    }
}

/// Moves detector output from model input space onto a display canvas and
/// attaches labels.
pub struct ResultMapper {
    labels: LabelMap,
}

impl ResultMapper {
    pub fn new(labels: LabelMap) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Scale every box by `dst / model` per axis. Order, confidence and
    /// class are kept as the detector produced them.
    pub fn map(
        &self,
        raw: &[RawDetection],
        model_width: u32,
        model_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<Vec<DisplayDetection>, PipelineError> {
        if model_width == 0 || model_height == 0 || dst_width == 0 || dst_height == 0 {
            return Err(PipelineError::Mapping(format!(
                "cannot scale {model_width}x{model_height} model space onto {dst_width}x{dst_height}"
            )));
        }

        let sx = dst_width as f32 / model_width as f32;
        let sy = dst_height as f32 / model_height as f32;

        Ok(raw
            .iter()
            .map(|det| DisplayDetection {
                class_id: det.class_id,
                label: self.labels.label(det.class_id).to_string(),
                confidence: det.confidence,
                bbox: det.bbox.scaled(sx, sy),
            })
            .collect())
    }
}
