use crate::detector::{BoundingBox, RawDetection};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Raw output tensors of an SSD-style detection head, flattened.
///
/// `boxes` holds `[top, left, bottom, right]` per detection, normalized to
/// the model input.
pub struct SsdOutput<'a> {
    pub boxes: &'a [f32],
    pub classes: &'a [f32],
    pub scores: &'a [f32],
    /// Valid entries reported by the model; `None` when it has no count output.
    pub count: Option<usize>,
}

/// Turn SSD output into detections in model input pixels.
///
/// Entries below `minimum_confidence` are dropped; model order is kept and
/// the result holds at most `max_detections` entries.
pub fn decode_ssd(
    output: &SsdOutput<'_>,
    minimum_confidence: f32,
    max_detections: usize,
    input_size: u32,
) -> Vec<RawDetection> {
    let available = output
        .scores
        .len()
        .min(output.classes.len())
        .min(output.boxes.len() / 4);
    let valid = output.count.map_or(available, |count| count.min(available));
    let size = input_size as f32;

    (0..valid)
        .filter(|&i| output.scores[i] >= minimum_confidence)
        .take(max_detections)
        .map(|i| {
            let b = &output.boxes[i * 4..i * 4 + 4];
            RawDetection {
                class_id: output.classes[i].max(0.0) as u32,
                confidence: output.scores[i],
                bbox: BoundingBox::new(b[1] * size, b[0] * size, b[3] * size, b[2] * size),
            }
        })
        .collect()
}

/// Normalize interleaved RGB bytes into `[-1, 1]` for float models.
pub fn normalize_rgb(rgb: &[u8], out: &mut Vec<f32>) {
    out.clear();
    out.extend(rgb.iter().map(|&v| (v as f32 - 127.5) / 127.5));
}
