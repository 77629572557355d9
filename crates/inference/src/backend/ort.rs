use super::{SsdOutput, decode_ssd, normalize_rgb};
use crate::config::DetectorConfig;
use crate::detector::{Detector, RawDetection};
use anyhow::{Context, ensure};
use ndarray::ArrayView4;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::PackedPixelBuffer;

/// SSD-style detector running on ONNX Runtime (CPU).
///
/// Expects one NHWC RGB input and outputs in the order boxes, classes,
/// scores and optionally count.
pub struct OrtDetector {
    session: Session,
    input_size: u32,
    is_quantized: bool,
    minimum_confidence: f32,
    rgb: Vec<u8>,
    float_input: Vec<f32>,
}

impl Detector for OrtDetector {
    fn load(config: &DetectorConfig) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.model_file)
            .with_context(|| format!("Failed to load model {}", config.model_file.display()))?;

        tracing::info!(
            model = %config.model_file.display(),
            input_size = config.input_size,
            quantized = config.is_quantized,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_size: config.input_size,
            is_quantized: config.is_quantized,
            minimum_confidence: config.minimum_confidence,
            rgb: Vec::new(),
            float_input: Vec::new(),
        })
    }

    fn detect(
        &mut self,
        pixels: &PackedPixelBuffer,
        max_detections: usize,
    ) -> anyhow::Result<Vec<RawDetection>> {
        ensure!(
            pixels.width() == self.input_size && pixels.height() == self.input_size,
            "Expected {0}x{0} input, got {1}x{2}",
            self.input_size,
            pixels.width(),
            pixels.height()
        );

        let side = self.input_size as usize;
        let shape = (1, side, side, 3);
        pixels.write_rgb(&mut self.rgb);

        let outputs = if self.is_quantized {
            let view = ArrayView4::from_shape(shape, &self.rgb)?;
            self.session
                .run(ort::inputs![TensorRef::from_array_view(view)?])?
        } else {
            normalize_rgb(&self.rgb, &mut self.float_input);
            let view = ArrayView4::from_shape(shape, &self.float_input)?;
            self.session
                .run(ort::inputs![TensorRef::from_array_view(view)?])?
        };

        let boxes: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let classes: Vec<f32> = outputs[1].try_extract_array::<f32>()?.iter().copied().collect();
        let scores: Vec<f32> = outputs[2].try_extract_array::<f32>()?.iter().copied().collect();
        let count = if outputs.len() > 3 {
            outputs[3]
                .try_extract_array::<f32>()?
                .iter()
                .next()
                .map(|&c| c.max(0.0) as usize)
        } else {
            None
        };

        Ok(decode_ssd(
            &SsdOutput {
                boxes: &boxes,
                classes: &classes,
                scores: &scores,
                count,
            },
            self.minimum_confidence,
            max_detections,
            self.input_size,
        ))
    }
}
